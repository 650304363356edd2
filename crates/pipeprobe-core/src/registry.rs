//! Correlation registry
//!
//! Publishers register the device ID of every outbound message before it is
//! sent; the event consumer delivers every message it reads back. The first
//! delivery for a registered key resolves that key's pending handle.

use crate::message::Message;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

struct Slot {
    id: u64,
    tx: oneshot::Sender<Message>,
}

type SlotMap = Arc<Mutex<HashMap<String, Slot>>>;

/// Shared key -> pending slot map.
///
/// Cloning yields another handle to the same registry. Registering a key
/// that already has a pending slot replaces it silently (last register
/// wins); the replaced handle never resolves.
#[derive(Clone, Default)]
pub struct CorrelationRegistry {
    slots: SlotMap,
    next_id: Arc<AtomicU64>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh slot for `key` and returns the handle that resolves
    /// when a message with that key is delivered.
    pub fn register(&self, key: impl Into<String>) -> PendingResponse {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let replaced = self.slots.lock().insert(key.clone(), Slot { id, tx });
        if replaced.is_some() {
            trace!(key = %key, "replaced pending slot");
        }

        PendingResponse {
            key,
            id,
            rx: Some(rx),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Hands `message` to the slot registered under its device ID.
    ///
    /// Returns `false` when nothing is waiting for that key.
    pub fn deliver(&self, message: Message) -> bool {
        let slot = self.slots.lock().remove(message.device_id());
        match slot {
            // The receiver may have gone away between removal and send.
            Some(slot) => slot.tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Number of registered, unresolved slots.
    pub fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Single-use handle for one registered key.
///
/// Dropping an unresolved handle removes its slot from the registry, unless
/// a later `register` for the same key already replaced it.
pub struct PendingResponse {
    key: String,
    id: u64,
    rx: Option<oneshot::Receiver<Message>>,
    slots: SlotMap,
}

impl PendingResponse {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the correlated message.
    ///
    /// A handle whose slot was replaced never resolves; callers race this
    /// against their own cancellation.
    pub async fn recv(mut self) -> Message {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        match rx.await {
            Ok(message) => {
                self.rx = None;
                message
            }
            Err(_) => std::future::pending().await,
        }
    }

    /// Returns the message if it has already been delivered.
    pub fn try_recv(&mut self) -> Option<Message> {
        let message = self.rx.as_mut()?.try_recv().ok()?;
        self.rx = None;
        Some(message)
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.rx.is_none() {
            return;
        }
        let mut slots = self.slots.lock();
        if slots.get(&self.key).is_some_and(|slot| slot.id == self.id) {
            slots.remove(&self.key);
        }
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
