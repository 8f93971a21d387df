//! Secret redaction contract.
//!
//! The real secret-scrubbing engine is an external collaborator (spec §1) —
//! only its contract is used here: pass a string, get back a string with
//! secret-shaped substrings replaced. [`RegexScrubber`] is a conservative
//! default so the WAL is exercisable and testable without depending on the
//! real engine.

use regex::Regex;
use std::sync::OnceLock;

/// Contract for redacting secrets out of document content and string
/// metadata values before they are written to the WAL.
pub trait Scrubber: Send + Sync {
    /// Return `input` with any secret-shaped substrings replaced.
    fn scrub(&self, input: &str) -> String;
}

/// A conservative pattern-based scrubber covering common secret shapes:
/// OpenAI/Anthropic-style `sk-...` keys, `Bearer ...` tokens, and
/// AWS-style access key ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexScrubber;

fn patterns() -> &'static Vec<(Regex, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (Regex::new(r"sk-[A-Za-z0-9_-]{16,}").unwrap(), "[REDACTED_KEY]"),
            (
                Regex::new(r"(?i)bearer\s+[A-Za-z0-9\._-]{8,}").unwrap(),
                "Bearer [REDACTED_TOKEN]",
            ),
            (Regex::new(r"AKIA[0-9A-Z]{16}").unwrap(), "[REDACTED_AWS_KEY]"),
        ]
    })
}

impl Scrubber for RegexScrubber {
    fn scrub(&self, input: &str) -> String {
        let mut out = input.to_string();
        for (re, replacement) in patterns() {
            out = re.replace_all(&out, *replacement).into_owned();
        }
        out
    }
}
