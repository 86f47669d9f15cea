//! Persistence of databases in the storage directory
//!
//! This module provides:
//! 1. On-disk layouts (current `.dba` and legacy `.db` + `.bin`) with atomic writes
//! 2. Catalog discovery
//! 3. The storage engine
//! 4. Import of legacy archives

mod catalog;
mod engine;
pub mod layout;
pub mod legacy;

pub use catalog::scan;
pub use engine::StorageEngine;
pub use layout::{DatabaseFile, Layout};
pub use legacy::{LegacyArchive, MIN_CIPHERTEXT_LEN};
