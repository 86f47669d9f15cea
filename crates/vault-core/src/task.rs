//! Guard against double-submitting long-running operations
//!
//! Open, create, save, import and export are dominated by key derivation and file
//! I/O and run off the interactive thread. A second request for an action that is
//! still running is ignored rather than queued.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

/// Logical user action that may run in the background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Open,
    Create,
    Save,
    Rename,
    Delete,
    Import,
    Export,
}

/// Tracks which actions are in flight
#[derive(Debug, Clone, Default)]
pub struct OperationGuard {
    active: Arc<Mutex<HashSet<Action>>>,
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `action` as running, or return `None` if it already is
    pub fn try_begin(&self, action: Action) -> Option<InFlight> {
        if !self.lock().insert(action) {
            debug!("Ignoring {:?}: already in flight", action);
            return None;
        }
        Some(InFlight {
            action,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, action: Action) -> bool {
        self.lock().contains(&action)
    }

    /// Spawn `future` for `action` unless one is already running
    ///
    /// The flag is cleared when the task finishes, fails or panics.
    pub fn launch<F, T>(&self, action: Action, future: F) -> Option<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let ticket = self.try_begin(action)?;
        Some(tokio::spawn(async move {
            let _ticket = ticket;
            future.await
        }))
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Action>> {
        // A panic while holding the lock cannot leave the set half-updated
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ticket for a running action; dropping it marks the action idle
#[derive(Debug)]
pub struct InFlight {
    action: Action,
    active: Arc<Mutex<HashSet<Action>>>,
}

impl InFlight {
    pub fn action(&self) -> Action {
        self.action
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.action);
    }
}
