//! Discovery of databases in the storage directory

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use super::layout::{DATABASE_EXTENSION, LEGACY_CIPHER_EXTENSION, LEGACY_SALT_EXTENSION};
use crate::database::DatabaseRecord;
use crate::error::Result;

/// List the databases stored directly in `dir` as locked skeletons, sorted by name
///
/// `<name>.dba` files and complete `<name>.db` + `<name>.bin` pairs are recognised.
/// A missing directory is an empty catalog.
pub async fn scan(dir: &Path) -> Result<Vec<DatabaseRecord>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Storage directory {:?} does not exist", dir);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut names = BTreeSet::new();
    let mut legacy_ciphers = BTreeSet::new();
    let mut legacy_salts = BTreeSet::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let (Some(stem), Some(extension)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|e| e.to_str()),
        ) else {
            continue;
        };

        match extension {
            DATABASE_EXTENSION => {
                names.insert(stem.to_string());
            }
            LEGACY_CIPHER_EXTENSION => {
                legacy_ciphers.insert(stem.to_string());
            }
            LEGACY_SALT_EXTENSION => {
                legacy_salts.insert(stem.to_string());
            }
            _ => {}
        }
    }

    names.extend(legacy_ciphers.intersection(&legacy_salts).cloned());
    debug!("Found {} databases in {:?}", names.len(), dir);

    Ok(names.into_iter().map(DatabaseRecord::locked).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(records: &[DatabaseRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let records = scan(&temp_dir.path().join("nope")).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_lists_sorted_locked_skeletons() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for file in ["work.dba", "Personal.dba", "archive.dba", "notes.txt", "settings.json"] {
            std::fs::write(dir.join(file), b"x").unwrap();
        }
        std::fs::create_dir(dir.join("nested.dba")).unwrap();

        let records = scan(dir).await.unwrap();

        assert_eq!(names(&records), vec!["Personal", "archive", "work"]);
        assert!(records.iter().all(|r| !r.is_unlocked() && r.salt().is_none()));
    }

    #[tokio::test]
    async fn test_legacy_pairs_and_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for file in ["old.db", "old.bin", "half.db", "both.dba", "both.db", "both.bin"] {
            std::fs::write(dir.join(file), b"x").unwrap();
        }

        let records = scan(dir).await.unwrap();

        assert_eq!(names(&records), vec!["both", "old"]);
    }
}
