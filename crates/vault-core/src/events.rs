//! Notifications published by the storage engine

use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging
pub(crate) const EVENT_CAPACITY: usize = 64;

/// State change of one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEvent {
    Created(String),
    Opened(String),
    Closed(String),
    Saved(String),
    Renamed { from: String, to: String },
    Deleted(String),
    Imported(String),
}

impl DatabaseEvent {
    /// Name of the database the event leaves behind
    pub fn name(&self) -> &str {
        match self {
            DatabaseEvent::Created(name)
            | DatabaseEvent::Opened(name)
            | DatabaseEvent::Closed(name)
            | DatabaseEvent::Saved(name)
            | DatabaseEvent::Deleted(name)
            | DatabaseEvent::Imported(name) => name,
            DatabaseEvent::Renamed { to, .. } => to,
        }
    }
}

pub(crate) fn channel() -> broadcast::Sender<DatabaseEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}
