//! Fernet-compatible authenticated tokens
//!
//! Token layout before base64url encoding:
//!
//! ```text
//! version (1) | timestamp, big-endian (8) | IV (16) | AES-128-CBC ciphertext (16*n) | HMAC-SHA256 (32)
//! ```
//!
//! The HMAC covers every preceding byte and is keyed with the signing half of the
//! derived key. Tokens never expire.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::MasterKey;
use crate::error::{Result, VaultError};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Only version ever written
pub const TOKEN_VERSION: u8 = 0x80;

const TIMESTAMP_LEN: usize = 8;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const HMAC_LEN: usize = 32;
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN + IV_LEN;

/// Shortest well-formed token: header, one cipher block and the tag
pub const MIN_TOKEN_LEN: usize = HEADER_LEN + BLOCK_LEN + HMAC_LEN;

/// Decoded token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Generation time (Unix seconds)
    pub timestamp: u64,
    /// Initialization vector
    pub iv: [u8; IV_LEN],
    /// AES-128-CBC ciphertext, PKCS7 padded
    pub ciphertext: Vec<u8>,
    /// HMAC-SHA256 over version, timestamp, IV and ciphertext
    pub hmac: [u8; HMAC_LEN],
}

impl Token {
    /// Encrypt and sign `plaintext` with explicit timestamp and IV
    pub fn seal(key: &MasterKey, timestamp: u64, iv: [u8; IV_LEN], plaintext: &[u8]) -> Result<Self> {
        let ciphertext = Aes128CbcEnc::new_from_slices(key.encryption_key(), &iv)
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Self {
            timestamp,
            iv,
            ciphertext,
            hmac: [0u8; HMAC_LEN],
        };
        token.hmac = token.sign(key)?;
        Ok(token)
    }

    /// Parse the text form; checks structure only, not authenticity
    pub fn from_string(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| VaultError::InvalidToken(format!("not base64url: {}", e)))?;

        if bytes.len() < MIN_TOKEN_LEN {
            return Err(VaultError::InvalidToken(format!(
                "too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != TOKEN_VERSION {
            return Err(VaultError::InvalidToken(format!(
                "unsupported version 0x{:02x}",
                bytes[0]
            )));
        }

        let (body, tag) = bytes.split_at(bytes.len() - HMAC_LEN);
        let ciphertext = &body[HEADER_LEN..];
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(VaultError::InvalidToken(
                "ciphertext is not a whole number of blocks".to_string(),
            ));
        }

        let mut timestamp = [0u8; TIMESTAMP_LEN];
        timestamp.copy_from_slice(&body[1..1 + TIMESTAMP_LEN]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&body[1 + TIMESTAMP_LEN..HEADER_LEN]);
        let mut hmac = [0u8; HMAC_LEN];
        hmac.copy_from_slice(tag);

        Ok(Self {
            timestamp: u64::from_be_bytes(timestamp),
            iv,
            ciphertext: ciphertext.to_vec(),
            hmac,
        })
    }

    /// Verify the tag, then decrypt
    pub fn open(&self, key: &MasterKey) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(key.signing_key())
            .map_err(|e| VaultError::InvalidToken(e.to_string()))?;
        mac.update(&self.signed_bytes());
        mac.verify_slice(&self.hmac)
            .map_err(|_| VaultError::InvalidToken("signature mismatch".to_string()))?;

        Aes128CbcDec::new_from_slices(key.encryption_key(), &self.iv)
            .map_err(|e| VaultError::InvalidToken(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&self.ciphertext)
            .map_err(|_| VaultError::InvalidToken("bad padding".to_string()))
    }

    fn sign(&self, key: &MasterKey) -> Result<[u8; HMAC_LEN]> {
        let mut mac = HmacSha256::new_from_slice(key.signing_key())
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?;
        mac.update(&self.signed_bytes());
        Ok(mac.finalize().into_bytes().into())
    }

    fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        bytes.push(TOKEN_VERSION);
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bytes = self.signed_bytes();
        bytes.extend_from_slice(&self.hmac);
        f.write_str(&URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Encrypt `plaintext` into a token stamped with the current time
pub fn encrypt(key: &MasterKey, plaintext: &[u8]) -> Result<String> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let timestamp = chrono::Utc::now().timestamp().max(0) as u64;

    Ok(Token::seal(key, timestamp, iv, plaintext)?.to_string())
}

/// Decrypt a token; any structural or integrity failure is `InvalidToken`
pub fn decrypt(key: &MasterKey, token: &str) -> Result<Vec<u8>> {
    Token::from_string(token)?.open(key)
}
