//! Peer-mesh signaling and connection lifecycle for WebRTC group calls
//!
//! This crate turns relay-delivered discovery and signal events into a
//! consistent set of live peer-to-peer media connections: it assigns
//! initiator/receiver roles deterministically through a readiness handshake,
//! tears sessions down cleanly on departure or relay loss, and swaps an
//! active media source (camera to screen share, camera flip) on every live
//! connection without renegotiating the underlying transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Relay (external)                                        │
//! │  ↓ events                      ↑ directed sends          │
//! │  SignalingChannel (WebSocketChannel / LocalRelay)        │
//! │  ↓                                                       │
//! │  PeerMeshManager (single event loop)                     │
//! │  ├─ readiness handshake → role assignment                │
//! │  ├─ PeerId → PeerSession map                             │
//! │  │   └─ SessionTransport (RtcTransport over webrtc)      │
//! │  └─ LocalMediaSource (kind → track, O(1) replacement)    │
//! │     ↓                                                    │
//! │  consumer callbacks (on_remote_stream, on_peer_removed)  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use peermesh::{
//!     LocalRelay, MeshConfig, PeerMeshManager, RtcFactory, SyntheticCapture, MediaCapture,
//! };
//! use std::sync::Arc;
//!
//! let config = MeshConfig::default();
//! let relay = LocalRelay::new();
//! let (channel, events) = relay.join("alice").await;
//!
//! let mesh = PeerMeshManager::new(&config, channel, Arc::new(RtcFactory::new()))?;
//! mesh.on_remote_stream(|peer, stream| println!("media from {peer}: {}", stream.id))
//!     .await;
//!
//! let media = SyntheticCapture::new()
//!     .acquire_local_media(&config.media)
//!     .await?;
//! mesh.start(media, Arc::new(config.ice.clone()), events).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;

// Component modules
pub mod media;
pub mod peer;
pub mod signaling;

// Re-exports for public API
pub use config::{
    FacingMode, IceConfig, IceServerConfig, MediaConstraints, MeshConfig, VideoConstraints,
};
pub use error::{Error, Result};
pub use media::{
    LocalMediaSource, MediaCapture, MediaTrack, RemoteStream, SyntheticCapture, TrackKind,
};
pub use peer::{
    PeerInfo, PeerMeshManager, PeerSession, RtcFactory, RtcTransport, SessionEvent,
    SessionEventSender, SessionRole, SessionState, SessionTransport, TransportFactory,
};
pub use signaling::{
    ChannelEvent, ChannelEventSender, ChannelEvents, LocalRelay, LocalRelayHandle, PeerId,
    PeerMessage, RelayMessage, SignalPayload, SignalingChannel, WebSocketChannel,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
