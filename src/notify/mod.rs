//! Cross-context change notifications.
//!
//! A [`Notifier`] is one context's view of the named change channel. Publishing is
//! fire-and-forget; subscribers run on their own task and treat every event as "re-fetch", so a
//! duplicate or echoed event is harmless. Contexts that are not subscribed when an event is
//! published never see it and must re-synchronize on their own when they become active again.

pub mod hub;

use crate::config::{CONFIG, SessionConfig};
use crate::error::NotifyError;
use futures::StreamExt;
use hub::BroadcastChannel;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Message carried on the change channel, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeEvent {
    /// The dataset changed; re-fetch.
    Update,

    /// A tag this build does not know. Never delivered to handlers.
    #[serde(other)]
    Unknown,
}

pub struct Notifier {
    context_id: Uuid,
    channel_name: String,
    capacity: usize,
    deliver_self: bool,
    port: Mutex<Option<Arc<BroadcastChannel>>>,
}

impl Notifier {
    pub fn new(channel_name: impl Into<String>) -> Self {
        let cfg = SessionConfig::default();
        Self {
            context_id: Uuid::new_v4(),
            channel_name: channel_name.into(),
            capacity: cfg.channel_capacity,
            deliver_self: cfg.deliver_self,
            port: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self::new(cfg.channel_name.clone())
            .with_capacity(cfg.channel_capacity)
            .with_deliver_self(cfg.deliver_self)
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Whether this context's own subscribers see the events it publishes.
    #[must_use]
    pub fn with_deliver_self(mut self, deliver_self: bool) -> Self {
        self.deliver_self = deliver_self;
        self
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// The live port, opening a fresh one if none exists yet or the last one was closed.
    pub fn channel(&self) -> Arc<BroadcastChannel> {
        let mut port = self.port.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = port.as_ref().filter(|p| !p.is_closed()) {
            return Arc::clone(existing);
        }

        if port.is_some() {
            debug!(channel = %self.channel_name, "Change channel was closed; reopening");
        } else {
            debug!(channel = %self.channel_name, "Opening change channel");
        }
        let fresh = Arc::new(BroadcastChannel::open(
            &self.channel_name,
            self.context_id,
            self.capacity,
        ));
        *port = Some(Arc::clone(&fresh));
        fresh
    }

    /// Closes the current port, as a context teardown would. The next access reopens it.
    pub fn close(&self) {
        let port = self.port.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(port) = port.as_ref() {
            port.close();
        }
    }

    /// Announces `event` to every subscribed context. Returns the number of receivers reached.
    pub fn publish(&self, event: &ChangeEvent) -> Result<usize, NotifyError> {
        let payload = serde_json::to_string(event)?;
        match self.channel().post(&payload) {
            // Closed between lookup and post; one reopen is enough.
            Err(NotifyError::Closed(_)) => self.channel().post(&payload),
            other => other,
        }
    }

    /// Runs `handler` for every recognized event until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<H>(&self, handler: H) -> Result<Subscription, NotifyError>
    where
        H: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let rx = match self.channel().subscribe() {
            Err(NotifyError::Closed(_)) => self.channel().subscribe()?,
            other => other?,
        };
        let own_id = self.context_id;
        let deliver_self = self.deliver_self;
        let channel = self.channel_name.clone();

        let task = tokio::spawn(async move {
            let mut stream = BroadcastStream::new(rx);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(envelope) => {
                        if !deliver_self && envelope.sender == own_id {
                            continue;
                        }
                        match serde_json::from_str::<ChangeEvent>(&envelope.payload) {
                            Ok(ChangeEvent::Unknown) => {
                                debug!(channel = %channel, "Ignoring event with unknown tag");
                            }
                            Ok(event) => handler(event),
                            Err(e) => {
                                debug!(channel = %channel, error = %e, "Ignoring malformed event");
                            }
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(channel = %channel, missed, "Subscriber lagged; forcing re-fetch");
                        handler(ChangeEvent::Update);
                    }
                }
            }
        });

        Ok(Subscription { task })
    }
}

/// Live subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

static NOTIFIER: OnceLock<Notifier> = OnceLock::new();

/// Process-wide notifier on the configured channel.
pub fn global() -> &'static Notifier {
    NOTIFIER.get_or_init(|| Notifier::from_config(&CONFIG.session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_uses_the_documented_wire_shape() {
        assert_eq!(
            serde_json::to_string(&ChangeEvent::Update).unwrap(),
            r#"{"type":"update"}"#
        );
    }

    #[test]
    fn extra_fields_and_unknown_tags_decode() {
        let event: ChangeEvent =
            serde_json::from_str(r#"{"type":"update","table":"patients"}"#).unwrap();
        assert_eq!(event, ChangeEvent::Update);

        let event: ChangeEvent = serde_json::from_str(r#"{"type":"purge","all":true}"#).unwrap();
        assert_eq!(event, ChangeEvent::Unknown);
    }

    #[test]
    fn closed_port_is_reopened_on_next_access() {
        let notifier = Notifier::new(format!("notify-unit-{}", Uuid::new_v4()));
        let first = notifier.channel();
        notifier.close();
        assert!(first.is_closed());

        let second = notifier.channel();
        assert!(!second.is_closed());
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(notifier.publish(&ChangeEvent::Update).is_ok());
    }
}
