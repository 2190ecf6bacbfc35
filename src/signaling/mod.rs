//! Peer discovery and signal relay
//!
//! The relay itself is an external collaborator; this module defines the wire
//! protocol, the consumed [`SignalingChannel`] interface, a WebSocket adapter
//! for real deployments, and an in-process hub for tests and loopback use.

pub mod channel;
pub mod protocol;
pub mod relay;
pub mod websocket;

pub use channel::{ChannelEventSender, ChannelEvents, SignalingChannel};
pub use protocol::{ChannelEvent, PeerId, PeerMessage, RelayMessage, SignalPayload};
pub use relay::{LocalRelay, LocalRelayHandle};
pub use websocket::WebSocketChannel;
