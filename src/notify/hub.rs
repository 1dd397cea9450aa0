//! Named, process-wide broadcast transport.
//!
//! Every port opened under the same name shares one underlying `tokio::sync::broadcast`
//! channel, so any context can post and every currently-subscribed context observes it.
//! A port can be closed independently; the shared channel outlives it. A channel is dropped from
//! the registry once no port and no receiver refers to it.

use crate::error::NotifyError;
use ahash::AHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A message as it travels on the bus: the sender context plus the encoded event.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: Uuid,
    pub payload: Arc<str>,
}

struct Registered {
    tx: broadcast::Sender<Envelope>,
    ports: usize,
}

impl Registered {
    fn in_use(&self) -> bool {
        self.ports > 0 || self.tx.receiver_count() > 0
    }
}

static CHANNELS: LazyLock<Mutex<AHashMap<String, Registered>>> =
    LazyLock::new(|| Mutex::new(AHashMap::new()));

fn join(name: &str, capacity: usize) -> broadcast::Sender<Envelope> {
    let mut channels = CHANNELS.lock().unwrap_or_else(PoisonError::into_inner);
    channels.retain(|_, registered| registered.in_use());
    let registered = channels
        .entry(name.to_string())
        .or_insert_with(|| Registered {
            tx: broadcast::channel(capacity.max(1)).0,
            ports: 0,
        });
    registered.ports += 1;
    registered.tx.clone()
}

fn leave(name: &str) {
    let mut channels = CHANNELS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(registered) = channels.get_mut(name) {
        registered.ports = registered.ports.saturating_sub(1);
        if !registered.in_use() {
            channels.remove(name);
        }
    }
}

/// One context's port onto a named channel.
#[derive(Debug)]
pub struct BroadcastChannel {
    name: String,
    owner: Uuid,
    tx: broadcast::Sender<Envelope>,
    closed: AtomicBool,
}

impl BroadcastChannel {
    /// Joins (creating on first use) the channel called `name`.
    pub fn open(name: &str, owner: Uuid, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            owner,
            tx: join(name, capacity),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Posts an encoded message. Returns how many receivers it reached; reaching nobody is not
    /// an error.
    pub fn post(&self, payload: &str) -> Result<usize, NotifyError> {
        if self.is_closed() {
            return Err(NotifyError::Closed(self.name.clone()));
        }
        let envelope = Envelope {
            sender: self.owner,
            payload: Arc::from(payload),
        };
        Ok(self.tx.send(envelope).unwrap_or(0))
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<Envelope>, NotifyError> {
        if self.is_closed() {
            return Err(NotifyError::Closed(self.name.clone()));
        }
        Ok(self.tx.subscribe())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for BroadcastChannel {
    fn drop(&mut self) {
        leave(&self.name);
    }
}
