//! Session transport seam
//!
//! The negotiation engine below a peer session is opaque and asynchronous:
//! the mesh issues requests and resumes on notifications. Notifications form
//! a fixed enumerated set dispatched into the manager's event loop.

use crate::config::IceConfig;
use crate::error::{Error, Result};
use crate::media::{MediaTrack, RemoteStream};
use crate::signaling::{PeerId, SignalPayload};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::session::SessionRole;

/// Notification emitted by a session transport, tagged with the peer it
/// belongs to
#[derive(Debug)]
pub enum SessionEvent {
    /// An outbound negotiation payload that must be relayed to the peer
    SignalProduced {
        /// Opaque payload for the remote transport
        payload: SignalPayload,
    },

    /// Remote media became available
    StreamReceived {
        /// The inbound stream handle
        stream: RemoteStream,
    },

    /// The underlying connection ended
    Closed,

    /// The underlying connection failed fatally
    Error {
        /// Cause of the failure
        error: Error,
    },
}

/// Sender half used by transports to notify the manager's event loop
pub type SessionEventSender = mpsc::UnboundedSender<(PeerId, SessionEvent)>;

/// One peer link's negotiation engine.
///
/// Implementations report progress exclusively through the
/// [`SessionEventSender`] handed to them at creation; no method blocks on
/// remote progress.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Begin negotiation for the given role.
    ///
    /// Initiators produce the first outbound payload; receivers wait for it.
    async fn begin(&self, role: SessionRole) -> Result<()>;

    /// Feed an inbound negotiation payload into the engine.
    ///
    /// May produce zero or more outbound payloads via `SignalProduced`.
    async fn accept_signal(&self, payload: SignalPayload) -> Result<()>;

    /// Swap the outbound track of matching kind in place, without
    /// renegotiating. The remote side observes a track substitution, not a
    /// connection teardown.
    async fn replace_track(&self, track: MediaTrack) -> Result<()>;

    /// Release the underlying connection resources
    async fn close(&self) -> Result<()>;
}

/// Factory creating one transport per peer session.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a transport for `peer_id`, attaching the given local track
    /// snapshot and wiring notifications into `events`.
    async fn create(
        &self,
        peer_id: &str,
        ice: Arc<IceConfig>,
        tracks: &[MediaTrack],
        events: SessionEventSender,
    ) -> Result<Arc<dyn SessionTransport>>;
}
