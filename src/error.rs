//! Centralized error types for lostphotosfound.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the lostphotosfound library.
#[derive(Error, Debug)]
pub enum LostPhotosError {
    /// The configuration file could not be read, parsed or is missing a key.
    #[error("Configuration error in '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// The IMAP host could not be reached (DNS, TCP or TLS failure).
    #[error("Could not connect to IMAP host '{host}': {reason}")]
    Connection { host: String, reason: String },

    /// The server rejected the credentials.
    #[error("Cannot login as '{username}', check username/password (2-factor accounts need an app password): {source}")]
    Auth {
        username: String,
        #[source]
        source: imap::Error,
    },

    /// Credentials were left empty in the configuration.
    #[error("Missing username or password parameters")]
    MissingCredentials,

    /// No "All Mail" folder could be located or selected.
    #[error("Could not open the All Mail folder: {0}")]
    Folder(String),

    /// The server refused the Gmail search expression.
    #[error("Search criteria returned a failure, it must be a valid Gmail search: {source}")]
    Search {
        #[source]
        source: imap::Error,
    },

    /// A matched message could not be fetched.
    #[error("Failed to fetch message UID {uid}: {source}")]
    Fetch {
        uid: u32,
        #[source]
        source: imap::Error,
    },

    /// Any other IMAP command failure (LIST, SELECT, CLOSE, LOGOUT).
    #[error("IMAP {command} failed: {source}")]
    Imap {
        command: &'static str,
        #[source]
        source: imap::Error,
    },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    Mime(String),
}

/// Convenience alias for `Result<T, LostPhotosError>`.
pub type Result<T> = std::result::Result<T, LostPhotosError>;

impl LostPhotosError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Config` variant from a path and a reason.
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an IMAP failure for a command that has no dedicated variant.
    pub fn imap(command: &'static str, source: imap::Error) -> Self {
        Self::Imap { command, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_mentions_path() {
        let err = LostPhotosError::config("/tmp/config", "missing option 'host' in [gmail]");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/config"));
        assert!(msg.contains("host"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;
        let err = LostPhotosError::io(
            "out/photo.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("out/photo.jpg"));
    }
}
