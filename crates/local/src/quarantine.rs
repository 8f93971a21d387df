//! Resilient open with quarantine: relocate corrupt collection directories
//! so the embedded engine can load (spec §4.7, C12).

use crate::collection::{is_collection_hash, METADATA_FILENAME, QUARANTINE_DIR};
use contextd_core::{ContextdError, Result};
use std::fs;
use std::path::Path;

/// Quarantine every subdirectory of `base` matching the collection-hash
/// pattern that contains a document file but no metadata sidecar, then
/// retry `open`.
///
/// Only hash-pattern-matched directories are ever touched — defense
/// against path injection via a maliciously named sibling directory.
pub fn resilient_open<T>(
    base: &Path,
    open: impl Fn() -> Result<T>,
) -> Result<T> {
    match open() {
        Ok(value) => Ok(value),
        Err(err) if is_missing_metadata_error(&err) => {
            let quarantined = quarantine_corrupt(base)?;
            if quarantined == 0 {
                return Err(err);
            }
            open()
        }
        Err(err) => Err(err),
    }
}

fn is_missing_metadata_error(err: &ContextdError) -> bool {
    matches!(err, ContextdError::Integrity(msg) if msg.contains("metadata file not found"))
}

/// Move every corrupt (doc-files-but-no-metadata) collection directory
/// under `base` into `base/.quarantine/`. Returns the number moved.
pub fn quarantine_corrupt(base: &Path) -> Result<usize> {
    if !base.exists() {
        return Ok(0);
    }
    let quarantine_dir = base.join(QUARANTINE_DIR);
    let mut moved = 0;

    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == QUARANTINE_DIR || !is_collection_hash(&name) {
            continue;
        }
        if !is_corrupt(&path) {
            continue;
        }

        fs::create_dir_all(&quarantine_dir)?;
        let dest = quarantine_dir.join(&name);
        fs::rename(&path, &dest)?;
        tracing::warn!(collection = %name, "quarantined corrupt collection directory");
        moved += 1;
    }

    Ok(moved)
}

fn is_corrupt(collection_dir: &Path) -> bool {
    let metadata_present = collection_dir.join(METADATA_FILENAME).is_file();
    if metadata_present {
        return false;
    }
    fs::read_dir(collection_dir)
        .map(|rd| rd.filter_map(|e| e.ok()).next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn moves_corrupt_dirs_into_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let corrupt = base.join("abcdef01");
        fs::create_dir_all(&corrupt).unwrap();
        File::create(corrupt.join("d1.bin")).unwrap();

        let moved = quarantine_corrupt(base).unwrap();
        assert_eq!(moved, 1);
        assert!(base.join(QUARANTINE_DIR).join("abcdef01").join("d1.bin").exists());
        assert!(!corrupt.exists());
    }

    #[test]
    fn leaves_healthy_dirs_alone() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let healthy = base.join("aaaaaaaa");
        fs::create_dir_all(&healthy).unwrap();
        File::create(healthy.join(METADATA_FILENAME)).unwrap();

        let moved = quarantine_corrupt(base).unwrap();
        assert_eq!(moved, 0);
        assert!(healthy.exists());
    }

    #[test]
    fn resilient_open_retries_once_after_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let corrupt = base.join("abcdef01");
        fs::create_dir_all(&corrupt).unwrap();
        File::create(corrupt.join("d1.bin")).unwrap();

        let attempts = AtomicUsize::new(0);
        let result: Result<()> = resilient_open(base, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ContextdError::Integrity("collection metadata file not found".into()))
            } else {
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(base.join(QUARANTINE_DIR).join("abcdef01").exists());
    }

    #[test]
    fn surfaces_original_error_if_nothing_to_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();

        let result: Result<()> = resilient_open(base, || {
            Err(ContextdError::Integrity("collection metadata file not found".into()))
        });
        assert!(result.is_err());
    }

    #[test]
    fn resilient_open_recovers_a_real_local_store_with_a_corrupt_collection() {
        use crate::store::{LocalStore, LocalStoreConfig};

        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        // Simulate a crash between writing the first document and writing
        // the collection's metadata sidecar: a hash-named directory with a
        // leftover document file and no `00000000.bin`.
        let corrupt = base.join(crate::collection::collection_hash("docs"));
        fs::create_dir_all(&corrupt).unwrap();
        File::create(corrupt.join("d1.bin")).unwrap();

        let config = LocalStoreConfig::new(base);
        let store = resilient_open(base, || LocalStore::open(config.clone())).unwrap();

        assert!(store.base().join(QUARANTINE_DIR).exists());
        assert!(!corrupt.exists());
    }
}
