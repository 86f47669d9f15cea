//! # vault-core
//!
//! Storage engine for DBA Vault, a multi-database password manager:
//! - PBKDF2-HMAC-SHA256 key derivation with a process-wide key cache
//! - Fernet-compatible token encryption of each database
//! - Catalog of `.dba` files (and legacy `.db` + `.bin` pairs) in one directory
//! - Create, open, save, rename, delete, export and import of databases
//! - Credential records with zeroize-on-drop handling of passwords and keys

pub mod crypto;
pub mod database;
pub mod error;
pub mod events;
pub mod record;
pub mod settings;
pub mod storage;
pub mod task;

pub use crypto::{decrypt, derive_key, encrypt, generate_salt, KeyCache, MasterKey, Salt, SecretString};
pub use database::{clean_name, DatabaseRecord};
pub use error::{ImportRejection, Result, VaultError};
pub use events::DatabaseEvent;
pub use record::{dumps, loads, Record, RecordMap};
pub use settings::{Settings, SettingsManager};
pub use storage::StorageEngine;
pub use task::{Action, InFlight, OperationGuard};
