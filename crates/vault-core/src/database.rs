//! In-memory representation of one database
//!
//! A database is unlocked exactly when it holds a password. There is no separate
//! flag: closing drops the password and the records with it.

use crate::crypto::{Salt, SecretString};
use crate::error::{Result, VaultError};
use crate::record::{Record, RecordMap};

/// Characters allowed in a database name besides ASCII letters and digits
const NAME_PUNCTUATION: &[char] = &['.', '-', '_', '(', ')'];

/// Strip every character outside `[A-Za-z0-9.\-_()]`
///
/// Nothing is substituted or collapsed: `" m a/i*n "` becomes `"main"`.
pub fn clean_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || NAME_PUNCTUATION.contains(c))
        .collect()
}

/// One named, password-protected collection of records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseRecord {
    /// Catalog key and on-disk file stem
    pub name: String,
    password: Option<SecretString>,
    salt: Option<Salt>,
    data: RecordMap,
}

impl DatabaseRecord {
    /// Locked skeleton as produced by a catalog scan
    pub fn locked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub(crate) fn unlocked(name: String, password: &str, salt: Salt, data: RecordMap) -> Self {
        Self {
            name,
            password: Some(SecretString::new(password)),
            salt: Some(salt),
            data,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.password.is_some()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(SecretString::expose)
    }

    /// Salt seen for this database in this process, if any
    pub fn salt(&self) -> Option<&Salt> {
        self.salt.as_ref()
    }

    /// Records, or `None` while locked
    pub fn records(&self) -> Option<&RecordMap> {
        self.is_unlocked().then_some(&self.data)
    }

    pub fn record(&self, key: &str) -> Option<&Record> {
        self.records().and_then(|records| records.get(key))
    }

    /// Insert or replace a record under its identifier; returns the replaced one
    pub fn insert_record(&mut self, record: Record) -> Result<Option<Record>> {
        let data = self.data_mut()?;
        Ok(data.insert(record.name.clone(), record))
    }

    /// Remove a record, keeping the order of the others
    pub fn remove_record(&mut self, key: &str) -> Result<Option<Record>> {
        let data = self.data_mut()?;
        Ok(data.shift_remove(key))
    }

    /// Mutable access to the records of an unlocked database
    pub fn data_mut(&mut self) -> Result<&mut RecordMap> {
        if !self.is_unlocked() {
            return Err(VaultError::DatabaseLocked(self.name.clone()));
        }
        Ok(&mut self.data)
    }

    /// Replace the password used on the next save
    pub fn set_password(&mut self, password: &str) -> Result<()> {
        if !self.is_unlocked() {
            return Err(VaultError::DatabaseLocked(self.name.clone()));
        }
        self.password = Some(SecretString::new(password));
        Ok(())
    }

    /// Records regardless of lock state, for engine-internal comparisons
    pub(crate) fn raw_data(&self) -> &RecordMap {
        &self.data
    }

    pub(crate) fn set_opened(&mut self, password: &str, salt: Salt, data: RecordMap) {
        self.password = Some(SecretString::new(password));
        self.salt = Some(salt);
        self.data = data;
    }

    /// Drop password and records, returning the password for key eviction
    pub(crate) fn lock(&mut self) -> Option<SecretString> {
        self.data.clear();
        self.password.take()
    }
}
