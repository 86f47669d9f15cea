//! Multi-database storage engine
//!
//! Keeps the working set of databases found in the storage directory and
//! implements every life-cycle operation on top of the catalog, the record
//! codec, the token cipher and the key cache. The engine assumes a single
//! writer per process; concurrent callers share it behind `Arc<RwLock<_>>`.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::catalog;
use super::layout::{self, DatabaseFile, Layout, DATABASE_EXTENSION};
use super::legacy;
use crate::crypto::{self, generate_salt, KeyCache, Salt, Token};
use crate::database::{clean_name, DatabaseRecord};
use crate::error::{ImportRejection, Result, VaultError};
use crate::events::{self, DatabaseEvent};
use crate::record::{self, RecordMap};

/// Storage engine for password-protected databases
pub struct StorageEngine {
    storage_dir: PathBuf,
    key_cache: Arc<KeyCache>,
    /// Sorted by name
    databases: Vec<DatabaseRecord>,
    events: broadcast::Sender<DatabaseEvent>,
}

impl StorageEngine {
    /// Engine over the default storage directory
    pub async fn new() -> Result<Self> {
        Self::with_dir(Self::default_storage_dir()?).await
    }

    /// Engine over a custom storage directory, with its own key cache
    pub async fn with_dir(storage_dir: PathBuf) -> Result<Self> {
        Self::with_key_cache(storage_dir, Arc::new(KeyCache::new())).await
    }

    /// Engine over `storage_dir` sharing an existing key cache
    pub async fn with_key_cache(storage_dir: PathBuf, key_cache: Arc<KeyCache>) -> Result<Self> {
        tokio::fs::create_dir_all(&storage_dir).await?;
        let databases = catalog::scan(&storage_dir).await?;

        info!(
            "Storage engine initialized at {:?} with {} databases",
            storage_dir,
            databases.len()
        );

        Ok(Self {
            storage_dir,
            key_cache,
            databases,
            events: events::channel(),
        })
    }

    /// Get the default storage directory
    pub fn default_storage_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "symbia-labs", "dba-vault")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| VaultError::StorageError("Could not determine data directory".to_string()))
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.key_cache
    }

    /// Working set, sorted by name
    pub fn databases(&self) -> &[DatabaseRecord] {
        &self.databases
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseRecord> {
        self.position(name).ok().map(|index| &self.databases[index])
    }

    /// Mutable handle for editing the records of an unlocked database in memory
    pub fn database_mut(&mut self, name: &str) -> Option<&mut DatabaseRecord> {
        let index = self.position(name).ok()?;
        Some(&mut self.databases[index])
    }

    /// Receive a [`DatabaseEvent`] for every state change
    pub fn subscribe(&self) -> broadcast::Receiver<DatabaseEvent> {
        self.events.subscribe()
    }

    /// Re-scan the directory, keeping unlocked databases as they are
    pub async fn refresh(&mut self) -> Result<()> {
        let scanned = catalog::scan(&self.storage_dir).await?;
        let mut merged: Vec<DatabaseRecord> = self
            .databases
            .drain(..)
            .filter(|db| db.is_unlocked())
            .collect();

        for skeleton in scanned {
            if !merged.iter().any(|db| db.name == skeleton.name) {
                merged.push(skeleton);
            }
        }
        merged.sort_by(|a, b| a.name.cmp(&b.name));
        self.databases = merged;

        debug!("Catalog refreshed: {} databases", self.databases.len());
        Ok(())
    }

    /// Create a new database protected by `password` and leave it unlocked
    pub async fn create(&mut self, name: &str, password: &str) -> Result<&DatabaseRecord> {
        let name = self.claim_name(name).await?;
        let salt = generate_salt();

        self.write_database(&name, password, &salt, &RecordMap::new())
            .await?;

        info!("Created database: {}", name);
        self.emit(DatabaseEvent::Created(name.clone()));
        let record = DatabaseRecord::unlocked(name, password, salt, RecordMap::new());
        Ok(self.insert_sorted(record))
    }

    /// Decrypt the on-disk database and unlock the in-memory record
    ///
    /// An already unlocked database is returned as is, unsaved edits included,
    /// provided `password` is the one it was opened with.
    pub async fn open(&mut self, name: &str, password: &str) -> Result<&DatabaseRecord> {
        let index = self.position(name)?;
        if let Some(current) = self.databases[index].password() {
            if current != password {
                warn!("Incorrect password for open database: {}", name);
                return Err(VaultError::IncorrectPassword);
            }
            debug!("Database already open: {}", name);
            return Ok(&self.databases[index]);
        }

        let file = layout::read(&self.storage_dir, name).await?;
        let data = match self.decrypt_file(&file, password).await {
            Ok(data) => data,
            Err(VaultError::IncorrectPassword) => {
                warn!("Incorrect password for database: {}", name);
                if !self.password_in_use(password) {
                    self.key_cache.remove(password).await;
                }
                return Err(VaultError::IncorrectPassword);
            }
            Err(e) => return Err(e),
        };

        self.databases[index].set_opened(password, file.salt, data);

        info!("Opened database: {}", name);
        self.emit(DatabaseEvent::Opened(name.to_string()));
        Ok(&self.databases[index])
    }

    /// Lock a database, forgetting its password, records and cached key
    pub async fn close(&mut self, name: &str) -> Result<()> {
        let index = self.position(name)?;
        let Some(password) = self.databases[index].lock() else {
            debug!("Database already closed: {}", name);
            return Ok(());
        };

        if !self.password_in_use(password.expose()) {
            self.key_cache.remove(password.expose()).await;
        }

        info!("Closed database: {}", name);
        self.emit(DatabaseEvent::Closed(name.to_string()));
        Ok(())
    }

    /// Close unless the database has unsaved changes and `force` is not set
    pub async fn close_checked(&mut self, name: &str, force: bool) -> Result<()> {
        let index = self.position(name)?;
        if !force && self.databases[index].is_unlocked() && !self.is_saved(name).await? {
            return Err(VaultError::UnsavedChanges(name.to_string()));
        }
        self.close(name).await
    }

    /// Persist `new_record` in place of the database called `old_name`
    ///
    /// The salt is kept while the name stays the same and regenerated on a rename.
    /// The new file is written completely before the old one is removed.
    pub async fn save(&mut self, old_name: &str, new_record: DatabaseRecord) -> Result<&DatabaseRecord> {
        let index = self.position(old_name)?;
        let password = new_record
            .password()
            .ok_or_else(|| VaultError::DatabaseLocked(new_record.name.clone()))?
            .to_string();

        let new_name = clean_name(&new_record.name);
        if new_name.is_empty() {
            return Err(VaultError::EmptyName);
        }
        let renamed = new_name != old_name;
        if renamed {
            self.ensure_name_free(&new_name).await?;
        }

        let old_record = &self.databases[index];
        let old_password = old_record.password().map(str::to_string);
        let salt = match (renamed, old_record.salt()) {
            (false, Some(salt)) => *salt,
            (false, None) => self.stored_salt(old_name).await?.unwrap_or_else(generate_salt),
            (true, _) => generate_salt(),
        };

        let data = new_record.raw_data().clone();
        self.write_database(&new_name, &password, &salt, &data).await?;

        // The new file is in place; the working set follows it before old files go
        self.databases.remove(index);
        self.insert_sorted(DatabaseRecord::unlocked(new_name.clone(), &password, salt, data));
        if let Some(old_password) = old_password.filter(|old| *old != password) {
            if !self.password_in_use(&old_password) {
                self.key_cache.remove(&old_password).await;
            }
        }

        let cleanup = if renamed {
            layout::remove(&self.storage_dir, old_name).await.map(|_| ())
        } else {
            layout::remove_legacy(&self.storage_dir, old_name).await
        };
        if let Err(e) = cleanup {
            warn!(
                "Saved {} but old files of {} remain in {:?}: {}",
                new_name, old_name, self.storage_dir, e
            );
            return Err(e);
        }

        if renamed {
            info!("Renamed database: {} -> {}", old_name, new_name);
            self.emit(DatabaseEvent::Renamed {
                from: old_name.to_string(),
                to: new_name.clone(),
            });
        } else {
            info!("Saved database: {}", new_name);
            self.emit(DatabaseEvent::Saved(new_name.clone()));
        }

        let index = self.position(&new_name)?;
        Ok(&self.databases[index])
    }

    /// Save the in-memory state of an unlocked database under its own name
    pub async fn save_current(&mut self, name: &str) -> Result<&DatabaseRecord> {
        let record = self.unlocked_copy(name)?;
        self.save(name, record).await
    }

    /// Rename an unlocked database, re-encrypting it under a fresh salt
    pub async fn rename(&mut self, name: &str, new_name: &str) -> Result<&DatabaseRecord> {
        let mut record = self.unlocked_copy(name)?;
        record.name = new_name.to_string();
        self.save(name, record).await
    }

    /// Re-encrypt an unlocked database with a new password, keeping its salt
    pub async fn change_password(&mut self, name: &str, new_password: &str) -> Result<&DatabaseRecord> {
        let mut record = self.unlocked_copy(name)?;
        record.set_password(new_password)?;
        self.save(name, record).await
    }

    /// Remove a database from disk and from the working set
    pub async fn delete(&mut self, name: &str) -> Result<()> {
        let index = self.position(name)?;

        if !layout::remove(&self.storage_dir, name).await? {
            warn!("Database {} had no file on disk", name);
        }

        let mut record = self.databases.remove(index);
        if let Some(password) = record.lock() {
            if !self.password_in_use(password.expose()) {
                self.key_cache.remove(password.expose()).await;
            }
        }

        info!("Deleted database: {}", name);
        self.emit(DatabaseEvent::Deleted(name.to_string()));
        Ok(())
    }

    /// Copy the stored bytes of `name` to `destination`
    ///
    /// A directory destination receives `<name>.dba`. Legacy databases are
    /// exported in the current layout. Returns the path written.
    pub async fn export(&self, name: &str, destination: &Path) -> Result<PathBuf> {
        let target = if tokio::fs::metadata(destination)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            layout::database_path(destination, name)
        } else {
            destination.to_path_buf()
        };

        let bytes = match layout::detect(&self.storage_dir, name).await? {
            Some(Layout::Current) => {
                let source = layout::database_path(&self.storage_dir, name);
                tokio::fs::read(&source)
                    .await
                    .map_err(|e| VaultError::from_io(e, &source))?
            }
            Some(Layout::Legacy) => layout::read(&self.storage_dir, name).await?.to_bytes(),
            None => {
                return Err(VaultError::FileNotFound(layout::database_path(
                    &self.storage_dir,
                    name,
                )))
            }
        };

        tokio::fs::write(&target, &bytes).await?;

        info!("Exported database {} to {:?}", name, target);
        Ok(target)
    }

    /// Copy an external `.dba` file into storage under its file stem
    pub async fn import(&mut self, source: &Path) -> Result<&DatabaseRecord> {
        if source.extension().and_then(|e| e.to_str()) != Some(DATABASE_EXTENSION) {
            warn!("Rejected import of {:?}: not a .{} file", source, DATABASE_EXTENSION);
            return Err(ImportRejection::WrongExtension(source.display().to_string()).into());
        }
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or(VaultError::EmptyName)?;
        let name = self.claim_name(stem).await?;

        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| VaultError::from_io(e, source))?;
        let file = DatabaseFile::from_bytes(&bytes)?;
        Token::from_string(&file.token)
            .map_err(|e| VaultError::CorruptDatabase(e.to_string()))?;

        layout::write_atomic(&layout::database_path(&self.storage_dir, &name), &bytes).await?;

        info!("Imported database {} from {:?}", name, source);
        self.emit(DatabaseEvent::Imported(name.clone()));
        Ok(self.insert_sorted(DatabaseRecord::locked(name)))
    }

    /// Install a database from a legacy two-file archive
    pub async fn import_legacy(&mut self, archive_path: &Path) -> Result<&DatabaseRecord> {
        let path = archive_path.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || legacy::read_archive(&path))
            .await
            .map_err(|e| VaultError::StorageError(e.to_string()))??;

        self.ensure_name_free(&archive.name).await?;
        legacy::install(&self.storage_dir, &archive).await?;

        info!("Imported legacy database {} from {:?}", archive.name, archive_path);
        self.emit(DatabaseEvent::Imported(archive.name.clone()));
        Ok(self.insert_sorted(DatabaseRecord::locked(archive.name)))
    }

    /// Whether the stored database holds exactly the in-memory records
    ///
    /// A missing file, or one the current password cannot decrypt, is never saved.
    pub async fn is_saved(&self, name: &str) -> Result<bool> {
        let index = self.position(name)?;
        let record = &self.databases[index];
        let password = record
            .password()
            .ok_or_else(|| VaultError::DatabaseLocked(name.to_string()))?;

        let file = match layout::read(&self.storage_dir, name).await {
            Ok(file) => file,
            Err(VaultError::FileNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        match self.decrypt_file(&file, password).await {
            Ok(stored) => Ok(&stored == record.raw_data()),
            Err(VaultError::IncorrectPassword) | Err(VaultError::CorruptDatabase(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn decrypt_file(&self, file: &DatabaseFile, password: &str) -> Result<RecordMap> {
        let key = self.key_cache.get_or_derive(password, &file.salt).await?;
        let plaintext = match crypto::decrypt(&key, &file.token) {
            Ok(plaintext) => plaintext,
            Err(VaultError::InvalidToken(reason)) => {
                debug!("Token rejected: {}", reason);
                return Err(VaultError::IncorrectPassword);
            }
            Err(e) => return Err(e),
        };

        let text = String::from_utf8(plaintext)
            .map_err(|e| VaultError::CorruptDatabase(format!("payload is not UTF-8: {}", e)))?;
        record::loads(&text).map_err(|e| VaultError::CorruptDatabase(e.to_string()))
    }

    async fn write_database(&self, name: &str, password: &str, salt: &Salt, data: &RecordMap) -> Result<()> {
        let key = self.key_cache.get_or_derive(password, salt).await?;
        let plaintext = record::dumps(data)?;
        let token = crypto::encrypt(&key, plaintext.as_bytes())?;

        let file = DatabaseFile { salt: *salt, token };
        layout::write_atomic(&layout::database_path(&self.storage_dir, name), &file.to_bytes()).await
    }

    async fn stored_salt(&self, name: &str) -> Result<Option<Salt>> {
        match layout::read(&self.storage_dir, name).await {
            Ok(file) => Ok(Some(file.salt)),
            Err(VaultError::FileNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Clean `raw` and make sure no database already uses the result
    async fn claim_name(&self, raw: &str) -> Result<String> {
        let name = clean_name(raw);
        if name.is_empty() {
            return Err(VaultError::EmptyName);
        }
        self.ensure_name_free(&name).await?;
        Ok(name)
    }

    async fn ensure_name_free(&self, name: &str) -> Result<()> {
        if self.position(name).is_ok() || layout::name_taken(&self.storage_dir, name).await? {
            return Err(VaultError::NameExists(name.to_string()));
        }
        Ok(())
    }

    fn unlocked_copy(&self, name: &str) -> Result<DatabaseRecord> {
        let record = &self.databases[self.position(name)?];
        if !record.is_unlocked() {
            return Err(VaultError::DatabaseLocked(name.to_string()));
        }
        Ok(record.clone())
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.databases
            .binary_search_by(|db| db.name.as_str().cmp(name))
            .map_err(|_| VaultError::DatabaseNotFound(name.to_string()))
    }

    fn insert_sorted(&mut self, record: DatabaseRecord) -> &DatabaseRecord {
        let index = match self
            .databases
            .binary_search_by(|db| db.name.cmp(&record.name))
        {
            Ok(index) => {
                self.databases[index] = record;
                index
            }
            Err(index) => {
                self.databases.insert(index, record);
                index
            }
        };
        &self.databases[index]
    }

    /// Whether an unlocked database still relies on `password`
    fn password_in_use(&self, password: &str) -> bool {
        self.databases.iter().any(|db| db.password() == Some(password))
    }

    fn emit(&self, event: DatabaseEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("storage_dir", &self.storage_dir)
            .field("databases", &self.databases.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::TempDir;

    async fn test_engine() -> (StorageEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let engine = StorageEngine::with_dir(temp_dir.path().to_path_buf())
            .await
            .unwrap();
        (engine, temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_reopen_empty() {
        let (mut engine, _temp) = test_engine().await;

        let created = engine.create("main", "pw").await.unwrap();
        assert!(created.is_unlocked());
        assert!(created.records().unwrap().is_empty());

        engine.close("main").await.unwrap();
        let opened = engine.open("main", "pw").await.unwrap();
        assert_eq!(opened.records().unwrap(), &RecordMap::new());
    }

    #[tokio::test]
    async fn test_create_cleans_and_validates_names() {
        let (mut engine, temp) = test_engine().await;

        let created = engine.create(" m a/i*n ", "pw").await.unwrap();
        assert_eq!(created.name, "main");
        assert!(temp.path().join("main.dba").exists());

        assert!(matches!(
            engine.create("main", "other").await,
            Err(VaultError::NameExists(name)) if name == "main"
        ));
        assert!(matches!(engine.create("/*?", "pw").await, Err(VaultError::EmptyName)));

        // Names are case-sensitive
        engine.create("Main", "pw").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_starts_with_salt() {
        let (mut engine, temp) = test_engine().await;

        let salt = *engine.create("vault", "pw").await.unwrap().salt().unwrap();
        let bytes = std::fs::read(temp.path().join("vault.dba")).unwrap();

        assert_eq!(&bytes[..16], &salt);
        assert!(std::str::from_utf8(&bytes[16..]).unwrap().starts_with("gAAAAA"));
    }

    #[tokio::test]
    async fn test_wrong_password_evicts_key() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("vault", "secret1").await.unwrap();
        engine.close("vault").await.unwrap();

        let result = engine.open("vault", "wrong").await;

        assert!(matches!(result, Err(VaultError::IncorrectPassword)));
        assert!(!engine.key_cache().contains("wrong").await);
        assert!(!engine.database("vault").unwrap().is_unlocked());
    }

    #[tokio::test]
    async fn test_close_evicts_key_and_data() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("vault", "pw").await.unwrap();
        assert!(engine.key_cache().contains("pw").await);

        engine.close("vault").await.unwrap();

        let db = engine.database("vault").unwrap();
        assert!(db.password().is_none());
        assert!(db.records().is_none());
        assert!(!engine.key_cache().contains("pw").await);
    }

    #[tokio::test]
    async fn test_shared_password_key_kept_while_in_use() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("a", "shared").await.unwrap();
        engine.create("b", "shared").await.unwrap();

        engine.close("a").await.unwrap();
        assert!(engine.key_cache().contains("shared").await);

        engine.close("b").await.unwrap();
        assert!(!engine.key_cache().contains("shared").await);
    }

    #[tokio::test]
    async fn test_is_saved_tracks_edits() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("vault", "pw").await.unwrap();
        assert!(engine.is_saved("vault").await.unwrap());

        engine
            .database_mut("vault")
            .unwrap()
            .insert_record(Record::new("github"))
            .unwrap();
        assert!(!engine.is_saved("vault").await.unwrap());

        engine.save_current("vault").await.unwrap();
        assert!(engine.is_saved("vault").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_saved_false_when_file_missing() {
        let (mut engine, temp) = test_engine().await;
        engine.create("vault", "pw").await.unwrap();
        std::fs::remove_file(temp.path().join("vault.dba")).unwrap();

        assert!(!engine.is_saved("vault").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_saved_requires_unlocked() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("vault", "pw").await.unwrap();
        engine.close("vault").await.unwrap();

        assert!(matches!(
            engine.is_saved("vault").await,
            Err(VaultError::DatabaseLocked(_))
        ));
    }

    #[tokio::test]
    async fn test_close_checked_refuses_unsaved() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("vault", "pw").await.unwrap();
        engine
            .database_mut("vault")
            .unwrap()
            .insert_record(Record::new("github"))
            .unwrap();

        assert!(matches!(
            engine.close_checked("vault", false).await,
            Err(VaultError::UnsavedChanges(_))
        ));
        engine.close_checked("vault", true).await.unwrap();
        assert!(!engine.database("vault").unwrap().is_unlocked());
    }

    #[tokio::test]
    async fn test_save_keeps_salt_rename_regenerates() {
        let (mut engine, temp) = test_engine().await;
        let salt = *engine.create("vault", "pw").await.unwrap().salt().unwrap();

        let saved_salt = *engine.save_current("vault").await.unwrap().salt().unwrap();
        assert_eq!(saved_salt, salt);

        let renamed = engine.rename("vault", "safe box").await.unwrap();
        assert_eq!(renamed.name, "safebox");
        assert_ne!(renamed.salt().unwrap(), &salt);

        assert!(!temp.path().join("vault.dba").exists());
        assert!(temp.path().join("safebox.dba").exists());
        assert!(engine.database("vault").is_none());
    }

    #[tokio::test]
    async fn test_rename_to_existing_name_fails() {
        let (mut engine, temp) = test_engine().await;
        engine.create("a", "pw").await.unwrap();
        engine.create("b", "pw").await.unwrap();

        assert!(matches!(
            engine.rename("a", "b").await,
            Err(VaultError::NameExists(_))
        ));
        assert!(temp.path().join("a.dba").exists());
    }

    #[tokio::test]
    async fn test_locked_database_cannot_be_renamed() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("a", "pw").await.unwrap();
        engine.close("a").await.unwrap();

        assert!(matches!(
            engine.rename("a", "b").await,
            Err(VaultError::DatabaseLocked(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("vault", "old").await.unwrap();

        engine.change_password("vault", "new").await.unwrap();
        assert!(!engine.key_cache().contains("old").await);
        engine.close("vault").await.unwrap();

        assert!(matches!(
            engine.open("vault", "old").await,
            Err(VaultError::IncorrectPassword)
        ));
        engine.open("vault", "new").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_entry() {
        let (mut engine, temp) = test_engine().await;
        engine.create("vault", "pw").await.unwrap();

        engine.delete("vault").await.unwrap();

        assert!(!temp.path().join("vault.dba").exists());
        assert!(engine.database("vault").is_none());
        assert!(!engine.key_cache().contains("pw").await);
        assert!(catalog::scan(temp.path()).await.unwrap().is_empty());
        assert!(matches!(
            engine.delete("vault").await,
            Err(VaultError::DatabaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_export_copies_bytes() {
        let (mut engine, temp) = test_engine().await;
        engine.create("vault", "pw").await.unwrap();
        let out_dir = TempDir::new().unwrap();

        let written = engine.export("vault", out_dir.path()).await.unwrap();

        assert_eq!(written, out_dir.path().join("vault.dba"));
        assert_eq!(
            std::fs::read(&written).unwrap(),
            std::fs::read(temp.path().join("vault.dba")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_export_missing_is_file_not_found() {
        let (engine, _temp) = test_engine().await;
        let out_dir = TempDir::new().unwrap();

        assert!(matches!(
            engine.export("ghost", out_dir.path()).await,
            Err(VaultError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let (mut engine, _temp) = test_engine().await;
        let mut events = engine.subscribe();

        engine.create("vault", "pw").await.unwrap();
        engine.close("vault").await.unwrap();
        engine.open("vault", "pw").await.unwrap();
        engine.rename("vault", "safe").await.unwrap();
        engine.delete("safe").await.unwrap();

        assert_eq!(events.recv().await.unwrap(), DatabaseEvent::Created("vault".into()));
        assert_eq!(events.recv().await.unwrap(), DatabaseEvent::Closed("vault".into()));
        assert_eq!(events.recv().await.unwrap(), DatabaseEvent::Opened("vault".into()));
        assert_eq!(
            events.recv().await.unwrap(),
            DatabaseEvent::Renamed {
                from: "vault".into(),
                to: "safe".into()
            }
        );
        assert_eq!(events.recv().await.unwrap(), DatabaseEvent::Deleted("safe".into()));
    }

    #[tokio::test]
    async fn test_refresh_keeps_unlocked_and_drops_vanished() {
        let (mut engine, temp) = test_engine().await;
        engine.create("open", "pw").await.unwrap();
        engine.create("gone", "pw").await.unwrap();
        engine.close("gone").await.unwrap();

        std::fs::remove_file(temp.path().join("gone.dba")).unwrap();
        std::fs::copy(temp.path().join("open.dba"), temp.path().join("copied.dba")).unwrap();

        engine.refresh().await.unwrap();

        let names: Vec<_> = engine.databases().iter().map(|db| db.name.as_str()).collect();
        assert_eq!(names, vec!["copied", "open"]);
        assert!(engine.database("open").unwrap().is_unlocked());
    }

    #[tokio::test]
    async fn test_open_while_unlocked_checks_password() {
        let (mut engine, _temp) = test_engine().await;
        engine.create("vault", "secret1").await.unwrap();
        engine
            .database_mut("vault")
            .unwrap()
            .insert_record(Record::new("github"))
            .unwrap();

        assert!(matches!(
            engine.open("vault", "wrong").await,
            Err(VaultError::IncorrectPassword)
        ));
        assert!(!engine.key_cache().contains("wrong").await);

        // The right password still returns the unsaved in-memory state
        let opened = engine.open("vault", "secret1").await.unwrap();
        assert!(opened.record("github").is_some());
    }

    #[tokio::test]
    async fn test_open_invalid_payload_is_corrupt() {
        let (mut engine, temp) = test_engine().await;
        let salt = generate_salt();
        let key = crypto::derive_key("pw", &salt);
        let file = DatabaseFile {
            salt,
            token: crypto::encrypt(&key, b"{not json").unwrap(),
        };
        std::fs::write(temp.path().join("broken.dba"), file.to_bytes()).unwrap();
        engine.refresh().await.unwrap();

        let result = engine.open("broken", "pw").await;

        assert!(matches!(result, Err(VaultError::CorruptDatabase(_))));
        assert!(!engine.database("broken").unwrap().is_unlocked());
    }

    #[tokio::test]
    async fn test_import_requires_dba_extension() {
        let (mut engine, temp) = test_engine().await;
        let outside = TempDir::new().unwrap();
        let source = outside.path().join("notes.txt");
        std::fs::write(&source, [0u8; 200]).unwrap();

        assert!(matches!(
            engine.import(&source).await,
            Err(VaultError::ImportValidation(ImportRejection::WrongExtension(_)))
        ));
        assert!(engine.database("notes").is_none());
        assert!(!temp.path().join("notes.dba").exists());
    }

    #[tokio::test]
    async fn test_rename_keeps_new_entry_when_old_files_remain() {
        let (mut engine, temp) = test_engine().await;
        engine.create("vault", "pw").await.unwrap();
        // A directory in place of the legacy cipher file cannot be removed as a file
        std::fs::create_dir(temp.path().join("vault.db")).unwrap();

        let result = engine.rename("vault", "safe").await;

        assert!(matches!(result, Err(VaultError::IoError(_))));
        assert!(temp.path().join("safe.dba").exists());
        assert!(engine.database("safe").unwrap().is_unlocked());
        assert!(engine.database("vault").is_none());
    }
}
