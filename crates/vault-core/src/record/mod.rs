//! Credential records and their interchange codec

mod codec;
mod types;

pub use codec::{dumps, loads};
pub use types::{Record, RecordMap};
