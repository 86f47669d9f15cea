//! Cryptographic primitives for database encryption
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 key derivation from passwords
//! - A process-wide cache of derived keys
//! - Fernet-compatible authenticated tokens (AES-128-CBC + HMAC-SHA256)
//! - Secure memory handling with zeroize

mod key_cache;
mod key_derivation;
mod secure_memory;
pub mod token;

pub use key_cache::KeyCache;
pub use key_derivation::{derive_key, generate_salt, Salt, PBKDF2_ITERATIONS, SALT_LEN};
pub use secure_memory::{MasterKey, SecretString, KEY_LEN};
pub use token::{decrypt, encrypt, Token};
