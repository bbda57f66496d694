//! Registry of live sessions, grouped by owner, used to fan out
//! notifications to every other device of the same user.

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// A frame queued for one connection. `written`, when present, fires once the
/// frame has been flushed to the socket.
#[derive(Debug)]
pub struct Outbound {
    pub text: String,
    pub written: Option<oneshot::Sender<()>>,
}

impl Outbound {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            written: None,
        }
    }

    pub fn acked(text: impl Into<String>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let outbound = Self {
            text: text.into(),
            written: Some(tx),
        };
        (outbound, rx)
    }
}

pub type Outbox = mpsc::UnboundedSender<Outbound>;

// owner -> connection -> outgoing queue
type Sessions = HashMap<Uuid, HashMap<Uuid, Outbox>>;

#[derive(Clone, Default)]
pub struct SessionHub {
    sessions: Arc<Mutex<Sessions>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        // The map stays consistent even if a holder panicked.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, owner: Uuid, connection_id: Uuid, tx: Outbox) {
        self.lock().entry(owner).or_default().insert(connection_id, tx);
        debug!("Session {} registered for {}", connection_id, owner);
    }

    pub fn unregister(&self, owner: Uuid, connection_id: Uuid) {
        let mut sessions = self.lock();
        if let Some(connections) = sessions.get_mut(&owner) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                sessions.remove(&owner);
            }
        }
        debug!("Session {} unregistered for {}", connection_id, owner);
    }

    /// Queue `message` for every session of `owner` except `except`.
    /// Returns how many sessions it was queued for.
    pub fn broadcast(&self, owner: Uuid, except: Uuid, message: &str) -> usize {
        let sessions = self.lock();
        let Some(connections) = sessions.get(&owner) else {
            return 0;
        };
        connections
            .iter()
            .filter(|(id, _)| **id != except)
            .filter(|(_, tx)| tx.send(Outbound::new(message)).is_ok())
            .count()
    }

    pub fn session_count(&self, owner: Uuid) -> usize {
        self.lock().get(&owner).map_or(0, HashMap::len)
    }
}
