use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Returned by [`DeliveryChannel::write`] when the receiving stream is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed;

/// Sending half of one open notification stream.
///
/// The stream endpoint owns the receiver. Dropping every sender ends the
/// stream, which is how a replaced or evicted channel gets closed.
#[derive(Debug, Clone)]
pub struct DeliveryChannel {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

impl DeliveryChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }

    /// Process-unique id of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn write(&self, frame: String) -> Result<(), ChannelClosed> {
        self.tx.send(frame).map_err(|_| ChannelClosed)
    }
}

/// Result of a lookup-and-write against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    NotConnected,
    /// The channel was registered but its stream had closed; the entry was evicted.
    Stale,
}

/// Maps each user id to its single open delivery channel.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, DeliveryChannel>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` for `user_id`, dropping whatever was there before.
    pub fn add(&self, user_id: &str, channel: DeliveryChannel) {
        if let Some(previous) = self.connections.insert(user_id.to_string(), channel) {
            tracing::debug!(
                user_id,
                connection_id = previous.id(),
                "replaced existing notification stream"
            );
        }
    }

    pub fn remove(&self, user_id: &str) {
        self.connections.remove(user_id);
    }

    /// Remove the entry for `user_id` only if it still belongs to `connection_id`.
    /// Returns whether an entry was removed.
    pub fn remove_connection(&self, user_id: &str, connection_id: u64) -> bool {
        self.connections
            .remove_if(user_id, |_, channel| channel.id() == connection_id)
            .is_some()
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    /// Write one frame to the user's channel, if any.
    ///
    /// The shard read lock is held for the write, so it cannot interleave
    /// with `add` or `remove` on the same key.
    pub fn write(&self, user_id: &str, frame: String) -> DeliveryOutcome {
        let stale_id = match self.connections.get(user_id) {
            None => return DeliveryOutcome::NotConnected,
            Some(channel) => match channel.write(frame) {
                Ok(()) => return DeliveryOutcome::Delivered,
                Err(ChannelClosed) => channel.id(),
            },
        };

        self.remove_connection(user_id, stale_id);
        DeliveryOutcome::Stale
    }

    /// Drop every channel. Open streams end once their buffered frames drain.
    pub fn close_all(&self) {
        let count = self.connections.len();
        self.connections.clear();
        if count > 0 {
            tracing::info!("closed {count} notification stream(s)");
        }
    }
}
