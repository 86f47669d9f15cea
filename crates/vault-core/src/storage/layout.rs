//! On-disk database layouts
//!
//! Current layout, one file per database:
//!
//! ```text
//! <name>.dba = salt (16 raw bytes) | token text (UTF-8)
//! ```
//!
//! Legacy layout, two files per database: `<name>.db` holds the token text and
//! `<name>.bin` the raw salt. Legacy files are read but never written, except
//! by the legacy archive import which installs them unchanged.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::crypto::{Salt, SALT_LEN};
use crate::error::{Result, VaultError};

/// Extension of current-format database files
pub const DATABASE_EXTENSION: &str = "dba";
/// Extension of legacy token files
pub const LEGACY_CIPHER_EXTENSION: &str = "db";
/// Extension of legacy salt files
pub const LEGACY_SALT_EXTENSION: &str = "bin";

/// Which on-disk layout holds a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Current,
    Legacy,
}

/// Decoded contents of a database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseFile {
    pub salt: Salt,
    pub token: String,
}

impl DatabaseFile {
    /// Current-format bytes: salt followed by the token text
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SALT_LEN + self.token.len());
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(self.token.as_bytes());
        bytes
    }

    /// Split current-format bytes into salt and token
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= SALT_LEN {
            return Err(VaultError::CorruptDatabase(format!(
                "file holds {} bytes, not enough for a salt and token",
                bytes.len()
            )));
        }
        let (salt_bytes, token_bytes) = bytes.split_at(SALT_LEN);
        Self::from_parts(salt_bytes, token_bytes)
    }

    fn from_parts(salt_bytes: &[u8], token_bytes: &[u8]) -> Result<Self> {
        let salt: Salt = salt_bytes.try_into().map_err(|_| {
            VaultError::CorruptDatabase(format!(
                "salt must be {} bytes, found {}",
                SALT_LEN,
                salt_bytes.len()
            ))
        })?;
        let token = std::str::from_utf8(token_bytes)
            .map_err(|e| VaultError::CorruptDatabase(format!("token is not UTF-8: {}", e)))?
            .to_string();

        Ok(Self { salt, token })
    }
}

/// Path of the current-format file for `name`
pub fn database_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, DATABASE_EXTENSION))
}

/// Paths of the legacy (token, salt) pair for `name`
pub fn legacy_paths(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}.{}", name, LEGACY_CIPHER_EXTENSION)),
        dir.join(format!("{}.{}", name, LEGACY_SALT_EXTENSION)),
    )
}

/// Layout present on disk for `name`; the current layout wins if both exist
pub async fn detect(dir: &Path, name: &str) -> Result<Option<Layout>> {
    if tokio::fs::try_exists(database_path(dir, name)).await? {
        return Ok(Some(Layout::Current));
    }
    let (cipher_path, salt_path) = legacy_paths(dir, name);
    if tokio::fs::try_exists(&cipher_path).await? && tokio::fs::try_exists(&salt_path).await? {
        return Ok(Some(Layout::Legacy));
    }
    Ok(None)
}

/// Whether any file of either layout already claims `name`
pub async fn name_taken(dir: &Path, name: &str) -> Result<bool> {
    let (cipher_path, salt_path) = legacy_paths(dir, name);
    Ok(tokio::fs::try_exists(database_path(dir, name)).await?
        || tokio::fs::try_exists(cipher_path).await?
        || tokio::fs::try_exists(salt_path).await?)
}

/// Read a database in whichever layout it is stored
pub async fn read(dir: &Path, name: &str) -> Result<DatabaseFile> {
    match detect(dir, name).await? {
        Some(Layout::Current) => {
            let path = database_path(dir, name);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| VaultError::from_io(e, &path))?;
            DatabaseFile::from_bytes(&bytes)
        }
        Some(Layout::Legacy) => {
            let (cipher_path, salt_path) = legacy_paths(dir, name);
            let salt = tokio::fs::read(&salt_path)
                .await
                .map_err(|e| VaultError::from_io(e, &salt_path))?;
            let token = tokio::fs::read(&cipher_path)
                .await
                .map_err(|e| VaultError::from_io(e, &cipher_path))?;
            debug!("Read legacy database: {}", name);
            DatabaseFile::from_parts(&salt, &token)
        }
        None => Err(VaultError::FileNotFound(database_path(dir, name))),
    }
}

/// Write `bytes` to a sibling temp file, flush it, then rename over `path`
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| VaultError::StorageError(format!("Invalid target path: {:?}", path)))?;
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

/// Remove every file of either layout for `name`; returns whether anything was removed
pub async fn remove(dir: &Path, name: &str) -> Result<bool> {
    let (cipher_path, salt_path) = legacy_paths(dir, name);
    let mut removed = false;

    for path in [database_path(dir, name), cipher_path, salt_path] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {:?}", path);
                removed = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(removed)
}

/// Remove only the legacy pair, after the database was rewritten in the current layout
pub async fn remove_legacy(dir: &Path, name: &str) -> Result<()> {
    let (cipher_path, salt_path) = legacy_paths(dir, name);
    for path in [cipher_path, salt_path] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed legacy file {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
