//! Import of legacy two-file archives
//!
//! An archive holds one database as two members sharing a base name:
//! `src/<name>.db` (token text, no salt prefix) and `src/<name>.bin` (16-byte salt).
//! Plain and gzip-compressed tar files are accepted. Everything is validated in
//! memory before a single file is written.

use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::{debug, warn};

use super::layout::{self, LEGACY_CIPHER_EXTENSION, LEGACY_SALT_EXTENSION};
use crate::crypto::{Salt, SALT_LEN};
use crate::database::clean_name;
use crate::error::{ImportRejection, Result, VaultError};

/// Smallest token file accepted; anything shorter is a truncated archive
pub const MIN_CIPHERTEXT_LEN: u64 = 100;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const EXPECTED_MEMBERS: usize = 2;

/// A validated legacy database, ready to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyArchive {
    pub name: String,
    pub ciphertext: Vec<u8>,
    pub salt: Salt,
}

struct Member {
    path: String,
    contents: Vec<u8>,
}

/// Read and validate the archive at `path`
pub fn read_archive(path: &Path) -> Result<LegacyArchive> {
    let bytes = std::fs::read(path).map_err(|e| VaultError::from_io(e, path))?;
    parse_archive(&bytes)
}

/// Validate an in-memory archive
pub fn parse_archive(bytes: &[u8]) -> Result<LegacyArchive> {
    let (members, count) = if bytes.starts_with(&GZIP_MAGIC) {
        read_members(GzDecoder::new(bytes))?
    } else {
        read_members(bytes)?
    };

    if count != EXPECTED_MEMBERS {
        warn!("Rejected legacy archive with {} files", count);
        return Err(ImportRejection::WrongMemberCount(count).into());
    }
    validate(members)
}

/// Collect the first two regular files and count all of them
fn read_members<R: Read>(reader: R) -> Result<(Vec<Member>, usize)> {
    let unreadable = |e: std::io::Error| ImportRejection::Unreadable(e.to_string());

    let mut archive = Archive::new(reader);
    let mut members = Vec::with_capacity(EXPECTED_MEMBERS);
    let mut count = 0;

    for entry in archive.entries().map_err(unreadable)? {
        let mut entry = entry.map_err(unreadable)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        count += 1;
        if count > EXPECTED_MEMBERS {
            continue;
        }

        let path = entry.path().map_err(unreadable)?.to_string_lossy().into_owned();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).map_err(unreadable)?;
        debug!("Archive member {} ({} bytes)", path, contents.len());
        members.push(Member { path, contents });
    }

    Ok((members, count))
}

fn split_member_name(path: &str) -> Result<(String, String)> {
    let file_name = Path::new(path);
    match (
        file_name.file_stem().and_then(|s| s.to_str()),
        file_name.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(extension)) => Ok((stem.to_string(), extension.to_string())),
        _ => Err(ImportRejection::UnexpectedMember(path.to_string()).into()),
    }
}

fn validate(members: Vec<Member>) -> Result<LegacyArchive> {
    let mut cipher = None;
    let mut salt = None;

    for member in members {
        let (stem, extension) = split_member_name(&member.path)?;
        match extension.as_str() {
            LEGACY_CIPHER_EXTENSION if cipher.is_none() => cipher = Some((stem, member.contents)),
            LEGACY_SALT_EXTENSION if salt.is_none() => salt = Some((stem, member.contents)),
            _ => return Err(ImportRejection::UnexpectedMember(member.path).into()),
        }
    }

    let (Some((cipher_stem, ciphertext)), Some((salt_stem, salt_bytes))) = (cipher, salt) else {
        return Err(ImportRejection::WrongMemberCount(EXPECTED_MEMBERS).into());
    };

    if cipher_stem != salt_stem {
        warn!("Rejected legacy archive with mismatched member names");
        return Err(ImportRejection::NameMismatch {
            cipher: cipher_stem,
            salt: salt_stem,
        }
        .into());
    }

    let salt: Salt = salt_bytes
        .as_slice()
        .try_into()
        .map_err(|_| ImportRejection::WrongSaltSize(salt_bytes.len() as u64))?;

    if (ciphertext.len() as u64) < MIN_CIPHERTEXT_LEN {
        return Err(ImportRejection::CiphertextTooSmall(ciphertext.len() as u64).into());
    }

    let name = clean_name(&cipher_stem);
    if name.is_empty() {
        return Err(VaultError::EmptyName);
    }

    Ok(LegacyArchive {
        name,
        ciphertext,
        salt,
    })
}

/// Write the two legacy files into `dir` unchanged
///
/// Either both files end up in place or neither does.
pub async fn install(dir: &Path, archive: &LegacyArchive) -> Result<()> {
    let (cipher_path, salt_path) = layout::legacy_paths(dir, &archive.name);
    layout::write_atomic(&cipher_path, &archive.ciphertext).await?;
    if let Err(e) = layout::write_atomic(&salt_path, &archive.salt).await {
        warn!("Installing {} failed, removing {:?}", archive.name, cipher_path);
        if let Err(cleanup) = tokio::fs::remove_file(&cipher_path).await {
            warn!("Could not remove {:?}: {}", cipher_path, cleanup);
        }
        return Err(e);
    }

    debug!("Installed legacy database {} ({} salt bytes)", archive.name, SALT_LEN);
    Ok(())
}
