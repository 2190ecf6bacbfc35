//! In-process signaling relay
//!
//! A loopback hub implementing the relay contract for participants living in
//! the same process: join broadcast to existing members, directed message
//! routing with per-sender FIFO, departure broadcast, and a close that
//! notifies every participant. Used by the integration suite and loopback
//! demos; a deployment talks to a real relay through
//! [`WebSocketChannel`](super::websocket::WebSocketChannel) instead.

use super::channel::{ChannelEventSender, ChannelEvents, SignalingChannel};
use super::protocol::{ChannelEvent, PeerId, PeerMessage};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Shared routing table of the hub
type Participants = Arc<RwLock<HashMap<PeerId, ChannelEventSender>>>;

/// In-process relay hub
#[derive(Default)]
pub struct LocalRelay {
    participants: Participants,
}

/// Per-participant handle implementing [`SignalingChannel`]
pub struct LocalRelayHandle {
    local_id: PeerId,
    participants: Participants,
}

impl LocalRelay {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant.
    ///
    /// Existing members are notified of the join (they discover the
    /// newcomer); the newcomer learns of them through their readiness
    /// announcements, mirroring the join-broadcast contract of a real relay.
    pub async fn join(&self, peer_id: &str) -> (Arc<LocalRelayHandle>, ChannelEvents) {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut participants = self.participants.write().await;
        for (existing, sender) in participants.iter() {
            debug!("relay: notifying {} of join by {}", existing, peer_id);
            let _ = sender.send(ChannelEvent::PeerDiscovered {
                peer_id: peer_id.to_string(),
            });
        }
        participants.insert(peer_id.to_string(), tx);

        let handle = Arc::new(LocalRelayHandle {
            local_id: peer_id.to_string(),
            participants: Arc::clone(&self.participants),
        });

        (handle, rx)
    }

    /// Unregister a participant and broadcast the departure to the rest
    pub async fn leave(&self, peer_id: &str) {
        let mut participants = self.participants.write().await;
        if participants.remove(peer_id).is_none() {
            return;
        }
        for sender in participants.values() {
            let _ = sender.send(ChannelEvent::PeerDeparted {
                peer_id: peer_id.to_string(),
            });
        }
    }

    /// Shut the hub down, notifying every participant of the loss
    pub async fn close(&self) {
        let mut participants = self.participants.write().await;
        for (peer_id, sender) in participants.drain() {
            debug!("relay: closing channel of {}", peer_id);
            let _ = sender.send(ChannelEvent::Closed);
        }
    }

    /// Number of registered participants
    pub async fn participant_count(&self) -> usize {
        self.participants.read().await.len()
    }
}

#[async_trait]
impl SignalingChannel for LocalRelayHandle {
    async fn send(&self, to: &str, message: PeerMessage) -> Result<()> {
        let participants = self.participants.read().await;
        let sender = participants
            .get(to)
            .ok_or_else(|| Error::SignalingError(format!("unknown peer {}", to)))?;

        sender
            .send(ChannelEvent::Message {
                from: self.local_id.clone(),
                message,
            })
            .map_err(|_| Error::SignalingError(format!("peer {} is no longer receiving", to)))
    }
}
