//! HMAC key storage: 32 random bytes, generated on first WAL
//! initialization, persisted as a single hidden file with mode 0600.

use crate::error::{WalError, WalResult};
use rand::RngCore;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const KEY_LEN: usize = 32;
const KEY_FILE_NAME: &str = ".hmac_key";

/// Load the WAL's HMAC key from `wal_root`, generating and persisting a new
/// one on first use.
///
/// Generation closes the TOCTOU window by writing to a random-suffixed temp
/// file with `O_CREATE | O_EXCL`, `fsync`ing it, then atomically renaming it
/// into place. On load, an insecure file mode is logged as a warning but
/// does not abort (spec §3).
pub fn load_or_generate(wal_root: &Path) -> WalResult<[u8; KEY_LEN]> {
    let key_path = wal_root.join(KEY_FILE_NAME);
    if key_path.exists() {
        return load(&key_path);
    }
    generate(wal_root, &key_path)
}

fn load(key_path: &Path) -> WalResult<[u8; KEY_LEN]> {
    let mut file = File::open(key_path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    if buf.len() != KEY_LEN {
        return Err(WalError::InvalidKeyLength);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = file.metadata()?.permissions().mode() & 0o777;
        if mode != 0o600 {
            tracing::warn!(
                path = %key_path.display(),
                mode = format!("{mode:o}"),
                "HMAC key file has insecure permissions"
            );
        }
    }

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&buf);
    Ok(key)
}

fn generate(wal_root: &Path, key_path: &Path) -> WalResult<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);

    let suffix: u64 = rand::thread_rng().next_u64();
    let tmp_path: PathBuf = wal_root.join(format!(".hmac_key.tmp.{suffix:x}"));

    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut tmp_file = opts.open(&tmp_path)?;
    tmp_file.write_all(&key)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    if let Err(e) = fs::rename(&tmp_path, key_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reloads_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let key1 = load_or_generate(dir.path()).unwrap();
        let key2 = load_or_generate(dir.path()).unwrap();
        assert_eq!(key1, key2);
    }

    #[cfg(unix)]
    #[test]
    fn key_file_has_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let _ = load_or_generate(dir.path()).unwrap();
        let meta = fs::metadata(dir.path().join(KEY_FILE_NAME)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
