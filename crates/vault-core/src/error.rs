//! Error types for vault-core

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Database name is empty once unsupported characters are removed")]
    EmptyName,

    #[error("A database named '{0}' already exists")]
    NameExists(String),

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Database is corrupt: {0}")]
    CorruptDatabase(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Import rejected: {0}")]
    ImportValidation(#[from] ImportRejection),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Database '{0}' is locked - open it with its password first")]
    DatabaseLocked(String),

    #[error("Database '{0}' has unsaved changes")]
    UnsavedChanges(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl VaultError {
    /// Translate an I/O error on `path`, keeping a missing file distinct from other failures.
    pub(crate) fn from_io(err: std::io::Error, path: &Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            VaultError::FileNotFound(path.to_path_buf())
        } else {
            VaultError::IoError(err)
        }
    }
}

/// Reasons a legacy archive is refused before anything is written
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportRejection {
    #[error("archive must contain exactly 2 files, found {0}")]
    WrongMemberCount(usize),

    #[error("file names do not match: '{cipher}' and '{salt}'")]
    NameMismatch { cipher: String, salt: String },

    #[error("salt file must be exactly 16 bytes, found {0}")]
    WrongSaltSize(u64),

    #[error("database file is too small to be valid ({0} bytes)")]
    CiphertextTooSmall(u64),

    #[error("unexpected archive member '{0}'")]
    UnexpectedMember(String),

    #[error("archive could not be read: {0}")]
    Unreadable(String),

    #[error("'{0}' is not a .dba database file")]
    WrongExtension(String),
}
