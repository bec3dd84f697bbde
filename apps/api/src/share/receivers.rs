//! Registry of live receivers: foreground sessions that can take a share directly.
//!
//! Posting is best-effort and at-most-once: a full or closed channel drops the
//! message. The pending-share store is the reliable path; this is the fast path.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::share::models::ShareMessage;

const RECEIVER_QUEUE_DEPTH: usize = 16;

pub type ReceiverId = Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    Share(ShareMessage),
    /// Asks the receiver to bring itself to the foreground.
    Focus,
}

struct Slot {
    seq: u64,
    tx: mpsc::Sender<ReceiverEvent>,
}

#[derive(Default)]
struct Registry {
    next_seq: u64,
    slots: HashMap<ReceiverId, Slot>,
}

#[derive(Clone, Default)]
pub struct ReceiverHub {
    inner: Arc<RwLock<Registry>>,
}

/// Keeps a receiver registered; dropping it unregisters.
pub struct ReceiverRegistration {
    id: ReceiverId,
    hub: ReceiverHub,
}

impl ReceiverRegistration {
    pub fn id(&self) -> ReceiverId {
        self.id
    }
}

impl Drop for ReceiverRegistration {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.hub.inner.write() {
            registry.slots.remove(&self.id);
        }
        debug!(receiver = %self.id, "Receiver unregistered");
    }
}

impl ReceiverHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (ReceiverRegistration, mpsc::Receiver<ReceiverEvent>) {
        let (tx, rx) = mpsc::channel(RECEIVER_QUEUE_DEPTH);
        let id = Uuid::new_v4();

        match self.inner.write() {
            Ok(mut registry) => {
                let seq = registry.next_seq;
                registry.next_seq += 1;
                registry.slots.insert(id, Slot { seq, tx });
            }
            Err(_) => warn!(receiver = %id, "Receiver registry poisoned; receiver will not get live shares"),
        }

        debug!(receiver = %id, "Receiver registered");
        (
            ReceiverRegistration {
                id,
                hub: self.clone(),
            },
            rx,
        )
    }

    /// Currently open receivers, most recently registered first.
    pub fn live_receivers(&self) -> Vec<ReceiverId> {
        let Ok(registry) = self.inner.read() else {
            return Vec::new();
        };
        let mut live: Vec<(u64, ReceiverId)> = registry
            .slots
            .iter()
            .filter(|(_, slot)| !slot.tx.is_closed())
            .map(|(id, slot)| (slot.seq, *id))
            .collect();
        live.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        live.into_iter().map(|(_, id)| id).collect()
    }

    /// Posts a share to one receiver. Returns whether it was queued.
    pub fn post(&self, id: ReceiverId, message: ShareMessage) -> bool {
        self.send(id, ReceiverEvent::Share(message))
    }

    pub fn focus(&self, id: ReceiverId) -> bool {
        self.send(id, ReceiverEvent::Focus)
    }

    fn send(&self, id: ReceiverId, event: ReceiverEvent) -> bool {
        let tx = match self.inner.read() {
            Ok(registry) => registry.slots.get(&id).map(|slot| slot.tx.clone()),
            Err(_) => None,
        };
        let Some(tx) = tx else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(receiver = %id, error = %e, "Dropped event for receiver");
                false
            }
        }
    }
}
