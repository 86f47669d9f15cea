//! Password-based key derivation using PBKDF2-HMAC-SHA256

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use super::secure_memory::{MasterKey, KEY_LEN};

/// Length of a database salt in bytes
pub const SALT_LEN: usize = 16;

/// Fixed PBKDF2 work factor; changing it makes every existing database unreadable
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Per-database salt
pub type Salt = [u8; SALT_LEN];

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a password and salt
///
/// This is deliberately slow. Callers on an interactive path go through
/// [`KeyCache`](super::KeyCache) instead of calling it directly.
pub fn derive_key(password: &str, salt: &Salt) -> MasterKey {
    let mut key_bytes = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key_bytes);

    let key = MasterKey::new(key_bytes);
    key_bytes.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_salt() {
        let salt1 = generate_salt();
        let salt2 = generate_salt();

        // Salts should be different
        assert_ne!(salt1, salt2);
    }

    #[test]
    fn test_derive_key_known_answer() {
        let salt: Salt = core::array::from_fn(|i| i as u8);
        let key = derive_key("secret1", &salt);

        assert_eq!(
            hex::encode(key.as_bytes()),
            "51f7afaa8339e6a3fbb0dde49171c3c1dc6d4547dcf8ca00135643da938534c7"
        );
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = generate_salt();

        let key1 = derive_key("test-password-123", &salt);
        let key2 = derive_key("test-password-123", &salt);

        assert_eq!(key1, key2);
    }

    #[test]
    fn test_derive_key_different_passwords() {
        let salt = generate_salt();

        let key1 = derive_key("password1", &salt);
        let key2 = derive_key("password2", &salt);

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_derive_key_different_salts() {
        let key1 = derive_key("test-password", &generate_salt());
        let key2 = derive_key("test-password", &generate_salt());

        assert_ne!(key1, key2);
    }
}
