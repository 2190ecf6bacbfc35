//! Consumed interface over the discovery/signal relay

use super::protocol::{ChannelEvent, PeerMessage};
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Receiving half of a channel subscription; consumed by the mesh manager's
/// event loop.
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// Sending half used by channel implementations to deliver notifications.
pub type ChannelEventSender = mpsc::UnboundedSender<ChannelEvent>;

/// Outbound side of the relay.
///
/// Implementations deliver [`ChannelEvent`]s through the receiver handed to
/// the manager at start, preserving per-sender order. `send` is best-effort:
/// a failure is logged by the caller and never retried at this layer
/// (retries, if any, belong to the relay).
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send a directed message to peer `to`
    async fn send(&self, to: &str, message: PeerMessage) -> Result<()>;
}
