//! Event fan-out to per-user channels.
//!
//! The engine collects the events of one operation in an [`Outbox`] while it
//! holds the store, then hands the outbox to the [`Notifier`] once the
//! transaction has committed. Delivery is best effort: a failing transport is
//! logged and otherwise ignored.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parley_shared::protocol::{Envelope, ServerEvent};
use parley_shared::types::UserId;
use parley_shared::ProtocolError;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Transport closed")]
    Closed,

    #[error("Encoding failed: {0}")]
    Encode(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Publish/subscribe relay the notifier pushes into.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<(), DeliveryError>;
}

/// Events produced by one operation, in emission order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Outbox {
    events: Vec<(UserId, ServerEvent)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, recipient: UserId, event: ServerEvent) {
        self.events.push((recipient, event));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(UserId, ServerEvent)> {
        self.events.iter()
    }
}

impl IntoIterator for Outbox {
    type Item = (UserId, ServerEvent);
    type IntoIter = std::vec::IntoIter<(UserId, ServerEvent)>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Push one event to `recipient`'s channel. Never fails.
    pub async fn notify(&self, recipient: UserId, event: ServerEvent) {
        let envelope = Envelope::new(recipient, event);
        let name = envelope.payload.name();
        let id = envelope.id;

        match self.transport.publish(envelope).await {
            Ok(()) => debug!(event = name, recipient = %recipient, %id, "event published"),
            Err(e) => warn!(event = name, recipient = %recipient, error = %e, "event delivery failed"),
        }
    }

    /// Publish every event of `outbox` sequentially, preserving order.
    pub async fn dispatch(&self, outbox: Outbox) {
        for (recipient, event) in outbox {
            self.notify(recipient, event).await;
        }
    }
}

// ---------------------------------------------------------------------------
// In-process hub
// ---------------------------------------------------------------------------

/// A subscriber's end of a user channel.
pub type ChannelSender = mpsc::UnboundedSender<Envelope>;

/// Channel name -> live subscribers. A user may be subscribed from several
/// devices at once; closed subscribers are pruned on the next publish.
#[derive(Clone, Default)]
pub struct InProcessHub {
    channels: Arc<DashMap<String, Vec<ChannelSender>>>,
}

impl InProcessHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new subscription on `user`'s private channel.
    pub fn subscribe(&self, user: UserId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.entry(user.channel()).or_default().push(tx);
        debug!(user = %user, "channel subscribed");
        rx
    }

    pub fn subscriber_count(&self, user: UserId) -> usize {
        self.channels
            .get(&user.channel())
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for InProcessHub {
    async fn publish(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        let Some(mut subscribers) = self.channels.get_mut(&envelope.channel) else {
            debug!(channel = %envelope.channel, "no subscribers, event dropped");
            return Ok(());
        };

        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        Ok(())
    }
}
