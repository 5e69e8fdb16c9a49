//! Key store: one PKCS#8 PEM file per local identity.
//!
//! Layout: `<dir>/<user_id>.pem`, created with mode 0600 on unix. The PEM
//! text is zeroized after every read and write.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use zeroize::Zeroizing;

use mb_crypto::PrivateKey;

use crate::error::KeyStoreError;

#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist `key` for `user_id`, replacing any previous key.
    pub fn save(&self, user_id: &str, key: &PrivateKey) -> Result<PathBuf, KeyStoreError> {
        let path = self.key_path(user_id)?;
        let pem = key.to_pkcs8_pem()?;
        fs::create_dir_all(&self.dir)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(pem.as_bytes())?;
        file.sync_all()?;

        tracing::info!(target: "mb_session", event = "key_saved", user_id = %user_id, path = %path.display());
        Ok(path)
    }

    /// `Ok(None)` when no key has been stored for `user_id`.
    pub fn load(&self, user_id: &str) -> Result<Option<PrivateKey>, KeyStoreError> {
        let path = self.key_path(user_id)?;
        let pem = match fs::read_to_string(&path) {
            Ok(pem) => Zeroizing::new(pem),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let key = PrivateKey::from_pkcs8_pem(&pem)?;
        tracing::debug!(target: "mb_session", event = "key_loaded", user_id = %user_id);
        Ok(Some(key))
    }

    /// Returns false if there was nothing to remove.
    pub fn remove(&self, user_id: &str) -> Result<bool, KeyStoreError> {
        let path = self.key_path(user_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn key_path(&self, user_id: &str) -> Result<PathBuf, KeyStoreError> {
        let unsafe_name = user_id.is_empty()
            || user_id.contains("..")
            || user_id.contains(['/', '\\', '\0']);
        if unsafe_name {
            return Err(KeyStoreError::InvalidUserId(user_id.to_string()));
        }
        Ok(self.dir.join(format!("{user_id}.pem")))
    }
}
