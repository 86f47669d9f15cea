//! Record type definitions

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Records of one database, keyed by their user-chosen identifier
pub type RecordMap = IndexMap<String, Record>;

/// One credential entry
///
/// Missing fields load as empty, unknown fields are ignored.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Identifier, also the key in the owning [`RecordMap`]
    pub name: String,

    pub username: String,

    pub email: String,

    pub password: String,

    /// Free-form date text, stored as entered
    pub date: String,

    pub comment: String,

    /// Copy the email rather than the username when the user asks for the login
    pub copy_email: bool,

    /// Attachment filename -> Base64 content
    pub attachments: IndexMap<String, String>,
}

impl Record {
    /// Create an empty record with the given identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach a file, replacing any attachment with the same name
    pub fn add_attachment(&mut self, filename: impl Into<String>, content: &[u8]) {
        self.attachments
            .insert(filename.into(), STANDARD.encode(content));
    }

    /// Decoded content of an attachment
    pub fn attachment(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        self.attachments
            .get(filename)
            .map(|encoded| {
                STANDARD.decode(encoded).map_err(|e| {
                    VaultError::CorruptDatabase(format!("attachment '{}': {}", filename, e))
                })
            })
            .transpose()
    }

    /// The value a "copy login" action should place on the clipboard
    pub fn login(&self) -> &str {
        if self.copy_email {
            &self.email
        } else {
            &self.username
        }
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("date", &self.date)
            .field("comment", &self.comment)
            .field("copy_email", &self.copy_email)
            .field("attachments", &self.attachments.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_roundtrip() {
        let mut record = Record::new("github");
        record.add_attachment("recovery.txt", b"codes\n1234");

        assert_eq!(
            record.attachment("recovery.txt").unwrap(),
            Some(b"codes\n1234".to_vec())
        );
        assert_eq!(record.attachment("missing").unwrap(), None);
    }

    #[test]
    fn test_bad_attachment_is_corrupt() {
        let mut record = Record::new("github");
        record
            .attachments
            .insert("broken".to_string(), "!!not base64!!".to_string());

        assert!(matches!(
            record.attachment("broken"),
            Err(VaultError::CorruptDatabase(_))
        ));
    }

    #[test]
    fn test_login_follows_copy_email() {
        let mut record = Record::new("mail");
        record.username = "alice".to_string();
        record.email = "alice@example.com".to_string();

        assert_eq!(record.login(), "alice");
        record.copy_email = true;
        assert_eq!(record.login(), "alice@example.com");
    }

    #[test]
    fn test_debug_hides_password() {
        let mut record = Record::new("bank");
        record.password = "hunter2".to_string();

        assert!(!format!("{:?}", record).contains("hunter2"));
    }
}
