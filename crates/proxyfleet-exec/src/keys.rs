//! SSH credential handling

use std::fmt;
use std::path::{Path, PathBuf};

/// How a host is authenticated
#[derive(Clone, PartialEq, Eq)]
pub enum SshCredential {
    /// Password authentication
    Password(String),
    /// Private key file on the local machine
    KeyFile(PathBuf),
}

impl fmt::Debug for SshCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshCredential::Password(_) => f.write_str("Password(***)"),
            SshCredential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

impl SshCredential {
    /// Short label for logs
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            SshCredential::Password(_) => "password",
            SshCredential::KeyFile(_) => "publickey",
        }
    }

    /// Check that a key file exists and is not readable by group or others
    ///
    /// # Errors
    /// Returns `KeyError` if the file is missing or its permissions are too open
    pub fn validate(&self) -> Result<(), KeyError> {
        match self {
            SshCredential::Password(_) => Ok(()),
            SshCredential::KeyFile(path) => validate_key_permissions(path),
        }
    }
}

/// Key validation errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    if !path.exists() {
        return Err(KeyError::NotFound(path.display().to_string()));
    }

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group and other bits
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn test_password_debug_is_redacted() {
        let cred = SshCredential::Password("hunter2".to_string());
        assert_eq!(format!("{cred:?}"), "Password(***)");
    }

    #[test]
    fn test_key_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519");
        std::fs::write(&path, "key").unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let cred = SshCredential::KeyFile(path.clone());
        assert!(matches!(cred.validate(), Err(KeyError::BadPermissions(_))));

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(cred.validate().is_ok());
    }

    #[test]
    fn test_missing_key_file() {
        let cred = SshCredential::KeyFile(PathBuf::from("/nonexistent/proxyfleet/key"));
        assert!(matches!(cred.validate(), Err(KeyError::NotFound(_))));
    }
}
