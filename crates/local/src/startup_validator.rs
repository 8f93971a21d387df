//! Startup Validator: an optional pre-flight gate on the health checker's
//! result (spec §4.7, C13).

use crate::health_checker::MetadataHealthChecker;
use contextd_core::{ContextdError, Result};
use std::path::PathBuf;

/// How strictly [`StartupValidator::run`] reacts to a non-healthy scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartupPolicy {
    /// Refuse to start if any collection is classified corrupt.
    pub fail_on_corruption: bool,
    /// Refuse to start if any collection is classified corrupt or empty.
    pub fail_on_degraded: bool,
}

/// Runs the Metadata Health Checker once, before services start, and
/// optionally blocks startup on a non-healthy result.
pub struct StartupValidator {
    base: PathBuf,
    policy: StartupPolicy,
}

impl StartupValidator {
    /// Construct a validator rooted at `base` with the given policy.
    pub fn new(base: impl Into<PathBuf>, policy: StartupPolicy) -> Self {
        Self {
            base: base.into(),
            policy,
        }
    }

    /// Run the checker once. With neither policy flag set, a non-healthy
    /// result is logged and startup proceeds — quarantine will handle it
    /// on open. With a flag set, a matching non-healthy result returns
    /// `Err`.
    pub fn run(&self) -> Result<()> {
        let checker = MetadataHealthChecker::new(&self.base);
        let health = checker.check()?;

        if health.corrupt_count > 0 {
            if self.policy.fail_on_corruption || self.policy.fail_on_degraded {
                return Err(ContextdError::Integrity(format!(
                    "startup validation failed: {} corrupt collection(s)",
                    health.corrupt_count
                )));
            }
            tracing::warn!(
                corrupt = health.corrupt_count,
                "startup validator found corrupt collections, proceeding (quarantine will handle on open)"
            );
        } else if health.empty_count > 0 && self.policy.fail_on_degraded {
            return Err(ContextdError::Integrity(format!(
                "startup validation failed: {} empty collection(s)",
                health.empty_count
            )));
        }

        Ok(())
    }
}
