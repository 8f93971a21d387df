//! Metadata Health Checker: classifies each on-disk collection directory as
//! healthy, corrupt, or empty (spec §4.7, C10).

use crate::collection::{is_collection_hash, METADATA_FILENAME, QUARANTINE_DIR};
use contextd_core::Result;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Classification of one collection directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionHealth {
    /// Metadata sidecar present.
    Healthy,
    /// Metadata sidecar missing, at least one document file present.
    Corrupt,
    /// Metadata sidecar missing, no document files either.
    Empty,
}

/// One collection's classification plus a diagnostic string.
#[derive(Debug, Clone)]
pub struct CollectionDiagnostic {
    /// The 8-hex directory name.
    pub hash: String,
    /// The classification.
    pub health: CollectionHealth,
    /// Human-readable detail (file counts, what was missing).
    pub diagnostic: String,
}

/// Aggregate result of one health scan.
#[derive(Debug, Clone)]
pub struct MetadataHealth {
    /// Per-collection classifications.
    pub collections: Vec<CollectionDiagnostic>,
    /// Count of healthy collections.
    pub healthy_count: usize,
    /// Count of corrupt collections.
    pub corrupt_count: usize,
    /// Count of empty collections.
    pub empty_count: usize,
    /// Wall-clock duration of the scan.
    pub scan_duration: Duration,
}

impl MetadataHealth {
    /// Whether every classified collection is healthy (no corrupt entries;
    /// empty directories do not count as unhealthy — they simply hold
    /// nothing yet).
    pub fn is_healthy(&self) -> bool {
        self.corrupt_count == 0
    }
}

/// Scans a local store's base directory and classifies every collection
/// subdirectory.
pub struct MetadataHealthChecker {
    base: std::path::PathBuf,
}

impl MetadataHealthChecker {
    /// Construct a checker rooted at `base`.
    pub fn new(base: impl Into<std::path::PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Run one scan, classifying every subdirectory except `.quarantine`
    /// and any name that doesn't look like a collection hash.
    pub fn check(&self) -> Result<MetadataHealth> {
        let start = Instant::now();
        let mut collections = Vec::new();
        let (mut healthy, mut corrupt, mut empty) = (0usize, 0usize, 0usize);

        if self.base.exists() {
            for entry in fs::read_dir(&self.base)? {
                let entry = entry?;
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == QUARANTINE_DIR || !is_collection_hash(&name) {
                    continue;
                }

                let (health, diagnostic) = classify(&path);
                match health {
                    CollectionHealth::Healthy => healthy += 1,
                    CollectionHealth::Corrupt => corrupt += 1,
                    CollectionHealth::Empty => empty += 1,
                }
                collections.push(CollectionDiagnostic {
                    hash: name,
                    health,
                    diagnostic,
                });
            }
        }

        let scan_duration = start.elapsed();
        metrics::gauge!("collections_total", "status" => "healthy").set(healthy as f64);
        metrics::gauge!("collections_total", "status" => "corrupt").set(corrupt as f64);
        metrics::gauge!("collections_total", "status" => "empty").set(empty as f64);
        metrics::histogram!("health_check_duration_seconds").record(scan_duration.as_secs_f64());
        metrics::counter!("health_checks_total", "result" => "success").increment(1);
        if corrupt > 0 {
            metrics::counter!("corrupt_collections_detected_total").increment(corrupt as u64);
        }

        Ok(MetadataHealth {
            collections,
            healthy_count: healthy,
            corrupt_count: corrupt,
            empty_count: empty,
            scan_duration,
        })
    }
}

fn classify(collection_dir: &Path) -> (CollectionHealth, String) {
    let metadata_present = collection_dir.join(METADATA_FILENAME).is_file();
    let doc_count = fs::read_dir(collection_dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.file_name() != METADATA_FILENAME)
                .count()
        })
        .unwrap_or(0);

    if metadata_present {
        (
            CollectionHealth::Healthy,
            format!("metadata present, {doc_count} document file(s)"),
        )
    } else if doc_count > 0 {
        (
            CollectionHealth::Corrupt,
            format!("metadata missing, {doc_count} document file(s) present"),
        )
    } else {
        (CollectionHealth::Empty, "metadata and documents both absent".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn classifies_healthy_corrupt_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();

        let healthy = base.join("aaaaaaaa");
        fs::create_dir_all(&healthy).unwrap();
        File::create(healthy.join(METADATA_FILENAME)).unwrap();

        let corrupt = base.join("bbbbbbbb");
        fs::create_dir_all(&corrupt).unwrap();
        File::create(corrupt.join("d1.bin")).unwrap();

        let empty = base.join("cccccccc");
        fs::create_dir_all(&empty).unwrap();

        let checker = MetadataHealthChecker::new(base);
        let health = checker.check().unwrap();
        assert_eq!(health.healthy_count, 1);
        assert_eq!(health.corrupt_count, 1);
        assert_eq!(health.empty_count, 1);
        assert!(!health.is_healthy());
    }

    #[test]
    fn skips_quarantine_and_non_hash_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join(QUARANTINE_DIR)).unwrap();
        fs::create_dir_all(base.join("not-a-hash")).unwrap();

        let checker = MetadataHealthChecker::new(base);
        let health = checker.check().unwrap();
        assert_eq!(health.collections.len(), 0);
    }

    #[test]
    fn all_healthy_when_no_collections_exist() {
        let dir = tempfile::tempdir().unwrap();
        let checker = MetadataHealthChecker::new(dir.path());
        let health = checker.check().unwrap();
        assert!(health.is_healthy());
    }
}
