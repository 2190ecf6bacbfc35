//! Per-peer session state machine

use crate::media::{MediaTrack, RemoteStream};
use crate::signaling::{PeerId, SignalPayload};
use crate::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::transport::SessionTransport;

/// Role of the local side in a pairwise negotiation.
///
/// Fixed at session creation; exactly one Initiator and one Receiver exist
/// per peer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// This side opens the negotiation
    Initiator,
    /// This side answers the negotiation
    Receiver,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no negotiation payload seen yet
    Created,
    /// Negotiation payloads flowing
    Signaling,
    /// Remote media arrived
    Connected,
    /// Torn down; terminal
    Closed,
}

/// One peer-to-peer connection: negotiation state, the payload exchange, and
/// the inbound/outbound track set.
pub struct PeerSession {
    /// Remote peer this session is connected to
    id: PeerId,

    /// Fixed negotiation role
    role: SessionRole,

    /// Current lifecycle state
    state: RwLock<SessionState>,

    /// Mirror of the local source at attach time and after each replacement
    outbound_tracks: RwLock<Vec<MediaTrack>>,

    /// Set once remote media arrives
    inbound_stream: RwLock<Option<RemoteStream>>,

    /// Underlying negotiation engine
    transport: Arc<dyn SessionTransport>,
}

impl PeerSession {
    /// Create a session attached to the given local track snapshot
    pub(crate) fn new(
        id: PeerId,
        role: SessionRole,
        tracks: Vec<MediaTrack>,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        Self {
            id,
            role,
            state: RwLock::new(SessionState::Created),
            outbound_tracks: RwLock::new(tracks),
            inbound_stream: RwLock::new(None),
            transport,
        }
    }

    /// The remote peer's identifier
    pub fn peer_id(&self) -> &str {
        &self.id
    }

    /// The fixed negotiation role
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Snapshot of the outbound tracks
    pub async fn outbound_tracks(&self) -> Vec<MediaTrack> {
        self.outbound_tracks.read().await.clone()
    }

    /// The inbound stream, once remote media has arrived
    pub async fn inbound_stream(&self) -> Option<RemoteStream> {
        self.inbound_stream.read().await.clone()
    }

    /// Kick off negotiation on the underlying transport
    pub(crate) async fn begin(&self) -> Result<()> {
        self.transport.begin(self.role).await
    }

    /// Record that the transport produced an outbound payload
    pub(crate) async fn note_signal_produced(&self) {
        self.mark_signaling().await;
    }

    /// Feed an inbound negotiation payload to the transport.
    ///
    /// Preserves the per-peer inbound ordering guarantee: callers invoke this
    /// sequentially from the manager loop. A payload arriving after close is
    /// dropped.
    pub(crate) async fn accept_signal(&self, payload: SignalPayload) -> Result<()> {
        if *self.state.read().await == SessionState::Closed {
            debug!("Dropping late signal for closed session {}", self.id);
            return Ok(());
        }

        self.mark_signaling().await;
        self.transport.accept_signal(payload).await
    }

    /// Record the inbound stream; returns true when this was the first
    /// arrival (the session just became connected).
    pub(crate) async fn set_inbound_stream(&self, stream: RemoteStream) -> bool {
        {
            let mut slot = self.inbound_stream.write().await;
            if slot.is_some() {
                debug!("Duplicate stream notification from {}", self.id);
                return false;
            }
            *slot = Some(stream);
        }

        self.set_state(SessionState::Connected).await;
        true
    }

    /// Swap the outbound track of matching kind in place.
    ///
    /// Only acts in `Signaling` or `Connected`; a call on a closed session is
    /// a no-op so a stale reference can never resurrect resources.
    pub(crate) async fn replace_track(&self, track: MediaTrack) -> Result<()> {
        match self.state().await {
            SessionState::Signaling | SessionState::Connected => {}
            other => {
                debug!(
                    "Skipping track replacement for {} in state {:?}",
                    self.id, other
                );
                return Ok(());
            }
        }

        {
            let mut tracks = self.outbound_tracks.write().await;
            match tracks.iter_mut().find(|t| t.kind == track.kind) {
                Some(slot) => *slot = track.clone(),
                None => {
                    debug!(
                        "No outbound {:?} track on session {} to replace",
                        track.kind, self.id
                    );
                    return Ok(());
                }
            }
        }

        self.transport.replace_track(track).await
    }

    /// Tear the session down: transport resources are released first, the
    /// state flips to `Closed` last, so an observer never sees `Closed`
    /// before resources are actually gone.
    ///
    /// Idempotent; returns true only on the call that performed the close.
    pub(crate) async fn close(&self) -> bool {
        let mut state = self.state.write().await;
        if *state == SessionState::Closed {
            return false;
        }

        if let Err(e) = self.transport.close().await {
            warn!("Error closing transport for {}: {}", self.id, e);
        }

        *state = SessionState::Closed;
        info!("Peer session closed: {}", self.id);
        true
    }

    /// Move `Created` to `Signaling`; later states are left alone
    async fn mark_signaling(&self) {
        let mut state = self.state.write().await;
        if *state == SessionState::Created {
            debug!("Peer {} session state: Created -> Signaling", self.id);
            *state = SessionState::Signaling;
        }
    }

    /// Guarded state transition; `Closed` is terminal
    async fn set_state(&self, new_state: SessionState) {
        let mut state = self.state.write().await;
        if *state == SessionState::Closed || *state == new_state {
            return;
        }
        debug!(
            "Peer {} session state: {:?} -> {:?}",
            self.id, *state, new_state
        );
        *state = new_state;
    }
}
