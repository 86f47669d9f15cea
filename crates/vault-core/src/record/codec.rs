//! JSON interchange for record collections

use super::types::RecordMap;
use crate::error::Result;

/// Serialize records; an empty collection becomes the empty string
pub fn dumps(records: &RecordMap) -> Result<String> {
    if records.is_empty() {
        return Ok(String::new());
    }
    Ok(serde_json::to_string(records)?)
}

/// Parse records; the empty string is an empty collection
pub fn loads(text: &str) -> Result<RecordMap> {
    if text.trim().is_empty() {
        return Ok(RecordMap::new());
    }
    Ok(serde_json::from_str(text)?)
}
