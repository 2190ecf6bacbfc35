//! Signaling protocol types for peer discovery and negotiation relay

use serde::{Deserialize, Serialize};

/// Opaque relay-assigned identifier of a remote participant.
///
/// Valid for the lifetime of that participant's connection; not reused after
/// departure within one process run.
pub type PeerId = String;

/// Opaque negotiation payload.
///
/// Produced and consumed by the session transport on either end; the mesh
/// layer routes it by peer ID and never inspects the contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalPayload(pub serde_json::Value);

impl SignalPayload {
    /// Wrap a JSON value as an opaque payload
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Consume the payload, yielding the inner JSON value
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// Directed message exchanged between two mesh participants through the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Readiness announcement, sent on discovering a peer.
    ///
    /// The recipient becomes the Initiator of the resulting session.
    Ready,

    /// Acknowledges a readiness announcement.
    ///
    /// The recipient (the original announcer) becomes the Receiver.
    ReadyAck,

    /// Opaque negotiation payload, routed to the matching peer session
    Signal {
        /// Transport-specific negotiation data
        payload: SignalPayload,
    },
}

/// Relay wire envelope
///
/// The relay is responsible for three event categories: a join broadcast, a
/// directed point-to-point signal relay, and a departure broadcast. The
/// `peer.announce` method is the client half of the join broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum RelayMessage {
    /// Announce this participant to the relay (client to relay)
    #[serde(rename = "peer.announce")]
    PeerAnnounce {
        /// Request parameters
        params: PeerAnnounceParams,
    },

    /// A new participant became reachable (relay to client)
    #[serde(rename = "peer.joined")]
    PeerJoined {
        /// Request parameters
        params: PeerJoinedParams,
    },

    /// A participant became unreachable (relay to client)
    #[serde(rename = "peer.left")]
    PeerLeft {
        /// Request parameters
        params: PeerLeftParams,
    },

    /// Directed signal between two participants (both directions)
    #[serde(rename = "peer.signal")]
    PeerSignal {
        /// Request parameters
        params: PeerSignalParams,
    },
}

/// Parameters for peer.announce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerAnnounceParams {
    /// Unique peer identifier
    pub peer_id: PeerId,
}

/// Parameters for peer.joined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerJoinedParams {
    /// Identifier of the newly reachable peer
    pub peer_id: PeerId,
}

/// Parameters for peer.left
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerLeftParams {
    /// Identifier of the departed peer
    pub peer_id: PeerId,
}

/// Parameters for peer.signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSignalParams {
    /// Sender peer ID
    pub from: PeerId,

    /// Recipient peer ID
    pub to: PeerId,

    /// The directed message being relayed
    pub message: PeerMessage,
}

impl RelayMessage {
    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize relay message: {}", e))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize relay message: {}", e))
        })
    }
}

/// Notification delivered by a signaling channel to the mesh manager.
///
/// Delivery order from the same peer is preserved; no ordering is guaranteed
/// between different peers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A new peer became reachable; fired at most once per ID until that ID
    /// departs
    PeerDiscovered {
        /// Identifier of the discovered peer
        peer_id: PeerId,
    },

    /// A peer became unreachable; extra deliveries are no-ops downstream
    PeerDeparted {
        /// Identifier of the departed peer
        peer_id: PeerId,
    },

    /// A directed message addressed to the local participant
    Message {
        /// Sending peer
        from: PeerId,
        /// The relayed message
        message: PeerMessage,
    },

    /// Relay connection lost; treated as every current peer departing
    Closed,
}
