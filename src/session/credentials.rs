//! On-disk persistence of session credentials.

use crate::error::{RelayError, Result};
use crate::session::SessionCredentials;
use std::path::PathBuf;
use tracing::debug;

const CREDENTIALS_FILE: &str = "session.json";

/// Stores the latest credential document under a directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }

    /// Returns `None` when nothing has been stored yet.
    pub fn load(&self) -> Result<Option<SessionCredentials>> {
        let path = self.path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RelayError::Credentials(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        let credentials = serde_json::from_slice(&bytes)
            .map_err(|e| RelayError::Credentials(format!("cannot parse {}: {e}", path.display())))?;
        Ok(Some(credentials))
    }

    /// Replace the stored credentials. Written to a sibling temp file
    /// first so a crash never leaves a truncated document behind.
    pub fn save(&self, credentials: &SessionCredentials) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            RelayError::Credentials(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let json = serde_json::to_vec_pretty(credentials)
            .map_err(|e| RelayError::Credentials(format!("cannot serialize credentials: {e}")))?;
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| RelayError::Credentials(format!("cannot write {}: {e}", tmp.display())))?;

        // Credentials grant full account access; owner-only before the file goes live.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
                RelayError::Credentials(format!("cannot restrict {}: {e}", tmp.display()))
            })?;
        }

        std::fs::rename(&tmp, &path)
            .map_err(|e| RelayError::Credentials(format!("cannot replace {}: {e}", path.display())))?;

        debug!("session credentials saved to {}", path.display());
        Ok(())
    }

    /// Forget stored credentials. Missing files are fine.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RelayError::Credentials(format!("cannot remove credentials: {e}"))),
        }
    }
}
