//! Persistent client identity.
//!
//! One token per installation, created on first use and kept in the platform
//! data directory so it survives restarts. The relay echoes every broadcast
//! back to its requester; the token is how a player recognizes its own echo.

use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use shared::ClientIdentity;
use uuid::Uuid;

const IDENTITY_FILE: &str = "client_id";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("no data directory available on this platform")]
    NoDataDir,
    #[error("identity file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// `<data dir>/client_id`, e.g. `~/.local/share/synced-playback/client_id`.
pub fn default_identity_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "synced-playback").map(|dirs| dirs.data_dir().join(IDENTITY_FILE))
}

/// Fresh random token.
pub fn generate() -> ClientIdentity {
    ClientIdentity::new(Uuid::new_v4().simple().to_string())
}

/// Read the identity stored at `path`, creating and storing one if the file
/// is missing or empty.
pub fn load_or_create(path: &Path) -> Result<ClientIdentity, IdentityError> {
    let io_err = |source: io::Error| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    };
    match std::fs::read_to_string(path) {
        Ok(stored) if !stored.trim().is_empty() => {
            return Ok(ClientIdentity::new(stored.trim()));
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(e)),
    }

    let identity = generate();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, identity.as_str()).map_err(io_err)?;
    tracing::info!(path = %path.display(), client_id = %identity, "created client identity");
    Ok(identity)
}

/// Load the identity from `path` (or the default location). Storage problems
/// are logged and answered with a session-only identity; a shared fallback
/// token would make failing players swallow each other's broadcasts.
pub fn resolve(path: Option<&Path>) -> ClientIdentity {
    let path = match path.map(Path::to_path_buf).or_else(default_identity_path) {
        Some(p) => p,
        None => {
            tracing::warn!(error = %IdentityError::NoDataDir, "using a session-only client identity");
            return generate();
        }
    };
    match load_or_create(&path) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "using a session-only client identity");
            generate()
        }
    }
}
