//! Peer mesh manager
//!
//! Owns the peer map, runs the readiness handshake that assigns
//! initiator/receiver roles, routes relay events to sessions, and fans
//! track replacement out to every live connection.

use crate::config::{IceConfig, MediaConstraints, MeshConfig};
use crate::error::{Error, Result};
use crate::media::{LocalMediaSource, MediaCapture, MediaTrack, RemoteStream, TrackKind};
use crate::signaling::{
    ChannelEvent, ChannelEvents, PeerId, PeerMessage, SignalPayload, SignalingChannel,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::session::{PeerSession, SessionRole, SessionState};
use super::transport::{SessionEvent, SessionEventSender, TransportFactory};

/// Snapshot of one live session for observability
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Peer identifier
    pub peer_id: PeerId,

    /// Negotiation role of the local side
    pub role: SessionRole,

    /// Current session state
    pub state: SessionState,
}

/// Callback invoked when a remote stream arrives
pub type RemoteStreamCallback = Arc<dyn Fn(PeerId, RemoteStream) + Send + Sync>;

/// Callback invoked once the local source is live
pub type LocalStreamCallback = Arc<dyn Fn(Vec<MediaTrack>) + Send + Sync>;

/// Callback invoked when a peer's session is removed
pub type PeerRemovedCallback = Arc<dyn Fn(PeerId) + Send + Sync>;

/// Callback invoked on surfaced errors
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Callback handlers for consumer-facing notifications
#[derive(Default)]
struct MeshCallbacks {
    on_remote_stream: Mutex<Option<RemoteStreamCallback>>,
    on_local_stream_ready: Mutex<Option<LocalStreamCallback>>,
    on_peer_removed: Mutex<Option<PeerRemovedCallback>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

/// State shared between the public handle and the event loop
struct MeshState {
    /// Local participant identifier
    local_id: PeerId,

    /// Relay send side
    channel: Arc<dyn SignalingChannel>,

    /// Creates one transport per session
    factory: Arc<dyn TransportFactory>,

    /// Upper bound on simultaneous sessions
    max_peers: u32,

    /// ICE configuration handed to every transport; set at start
    ice: RwLock<Option<Arc<IceConfig>>>,

    /// The local media source; exclusively owned here, sessions read
    /// snapshots
    media: RwLock<Option<LocalMediaSource>>,

    /// Live sessions, exactly one per discovered peer
    sessions: RwLock<HashMap<PeerId, Arc<PeerSession>>>,

    /// Peers we announced readiness to and whose acknowledgment is pending
    pending: RwLock<HashSet<PeerId>>,

    /// Sender handed to transports; refreshed on each start
    session_tx: RwLock<Option<SessionEventSender>>,

    /// Consumer callbacks
    callbacks: MeshCallbacks,

    /// Lifecycle flag
    started: AtomicBool,
}

/// Manages the full mesh of peer sessions for one participant.
///
/// All session mutation runs on a single event-loop task consuming relay and
/// transport notifications, so per-peer delivery order is preserved
/// end-to-end and handlers run to completion before the next event.
pub struct PeerMeshManager {
    state: Arc<MeshState>,
    shutdown: RwLock<Option<watch::Sender<bool>>>,
}

impl PeerMeshManager {
    /// Create a manager for the given configuration.
    ///
    /// The relay connection and transport factory are supplied by the
    /// embedding application; the manager subscribes to relay events at
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: &MeshConfig,
        channel: Arc<dyn SignalingChannel>,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let local_id = config
            .peer_id
            .clone()
            .unwrap_or_else(|| format!("peer-{}", uuid::Uuid::new_v4()));

        info!("Creating peer mesh manager: local_id={}", local_id);

        Ok(Self {
            state: Arc::new(MeshState {
                local_id,
                channel,
                factory,
                max_peers: config.max_peers,
                ice: RwLock::new(None),
                media: RwLock::new(None),
                sessions: RwLock::new(HashMap::new()),
                pending: RwLock::new(HashSet::new()),
                session_tx: RwLock::new(None),
                callbacks: MeshCallbacks::default(),
                started: AtomicBool::new(false),
            }),
            shutdown: RwLock::new(None),
        })
    }

    /// The local participant's identifier
    pub fn local_peer_id(&self) -> &str {
        &self.state.local_id
    }

    /// Start the mesh: adopt the media source and ICE configuration,
    /// subscribe to relay events, and spawn the event loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] when called twice without an
    /// intervening [`stop`](Self::stop).
    pub async fn start(
        &self,
        media: LocalMediaSource,
        ice: Arc<IceConfig>,
        events: ChannelEvents,
    ) -> Result<()> {
        if self.state.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        info!("Starting peer mesh: local_id={}", self.state.local_id);

        let snapshot = media.snapshot();
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        *self.state.ice.write().await = Some(ice);
        *self.state.media.write().await = Some(media);
        *self.state.session_tx.write().await = Some(session_tx);

        if let Some(cb) = self
            .state
            .callbacks
            .on_local_stream_ready
            .lock()
            .await
            .as_ref()
        {
            cb(snapshot);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.write().await = Some(shutdown_tx);

        tokio::spawn(Self::event_loop(
            Arc::clone(&self.state),
            events,
            session_rx,
            shutdown_rx,
        ));

        Ok(())
    }

    /// Stop the mesh: close every session, clear the map, release the media
    /// source. Safe to call when not started.
    pub async fn stop(&self) {
        if !self.state.started.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping peer mesh: local_id={}", self.state.local_id);

        if let Some(shutdown) = self.shutdown.write().await.take() {
            let _ = shutdown.send(true);
        }

        Self::teardown_all(&self.state).await;
        self.state.pending.write().await.clear();
        *self.state.session_tx.write().await = None;
        *self.state.media.write().await = None;
        *self.state.ice.write().await = None;
    }

    /// Atomically swap the local track of matching kind, then apply the
    /// replacement on every session currently negotiating or connected —
    /// without restarting negotiation.
    ///
    /// Never changes any session's state and never creates or destroys a
    /// session; sessions created after this call inherit the new track
    /// through the source snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] before [`start`](Self::start), or
    /// [`Error::MediaTrackError`] when the source holds no track of that
    /// kind. Per-session replacement failures are logged and isolated.
    pub async fn replace_outbound_track(&self, new_track: MediaTrack) -> Result<()> {
        {
            // The source swap lands before any fan-out, so a session created
            // concurrently always snapshots the new track.
            let mut media = self.state.media.write().await;
            let source = media.as_mut().ok_or(Error::NotStarted)?;
            let replaced = source.replace(new_track.clone())?;
            debug!(
                "Replaced local {:?} track {} with {}",
                new_track.kind, replaced.id, new_track.id
            );
        }

        let sessions: Vec<_> = self
            .state
            .sessions
            .read()
            .await
            .values()
            .cloned()
            .collect();

        for session in sessions {
            if let Err(e) = session.replace_track(new_track.clone()).await {
                warn!(
                    "Track replacement failed for peer {}: {}",
                    session.peer_id(),
                    e
                );
            }
        }

        Ok(())
    }

    /// Enable or disable the local track of the given kind (microphone mute,
    /// camera off). Advisory to the capture layer; negotiation is untouched.
    pub async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Result<bool> {
        let mut media = self.state.media.write().await;
        let source = media.as_mut().ok_or(Error::NotStarted)?;
        source.set_enabled(kind, enabled)
    }

    /// Acquire a fresh camera/microphone source (e.g. after flipping the
    /// facing mode) and swap each matching track onto the live sessions.
    ///
    /// # Errors
    ///
    /// Surfaces [`Error::MediaAcquisition`] from the capture capability.
    pub async fn switch_media(
        &self,
        capture: &dyn MediaCapture,
        constraints: &MediaConstraints,
    ) -> Result<()> {
        let acquired = capture.acquire_local_media(constraints).await?;
        self.adopt_tracks(acquired).await
    }

    /// Acquire a screen capture and swap its video track onto the live
    /// sessions.
    pub async fn share_screen(&self, capture: &dyn MediaCapture) -> Result<()> {
        let acquired = capture.acquire_display_media().await?;
        self.adopt_tracks(acquired).await
    }

    /// Route every track of an acquired source through track replacement,
    /// skipping kinds the current source does not carry.
    async fn adopt_tracks(&self, acquired: LocalMediaSource) -> Result<()> {
        for track in acquired.snapshot() {
            let has_kind = {
                let media = self.state.media.read().await;
                media
                    .as_ref()
                    .ok_or(Error::NotStarted)?
                    .track(track.kind)
                    .is_some()
            };
            if !has_kind {
                debug!("Ignoring acquired {:?} track: no active counterpart", track.kind);
                continue;
            }
            self.replace_outbound_track(track).await?;
        }
        Ok(())
    }

    /// Snapshot of the current local tracks (for re-rendering the local
    /// preview after a switch)
    pub async fn local_tracks(&self) -> Result<Vec<MediaTrack>> {
        let media = self.state.media.read().await;
        Ok(media.as_ref().ok_or(Error::NotStarted)?.snapshot())
    }

    /// Snapshot of all live sessions
    pub async fn list_peers(&self) -> Vec<PeerInfo> {
        let sessions: Vec<_> = self
            .state
            .sessions
            .read()
            .await
            .values()
            .cloned()
            .collect();

        let mut peers = Vec::with_capacity(sessions.len());
        for session in sessions {
            peers.push(PeerInfo {
                peer_id: session.peer_id().to_string(),
                role: session.role(),
                state: session.state().await,
            });
        }
        peers
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.state.sessions.read().await.len()
    }

    /// Set the callback for inbound remote streams
    pub async fn on_remote_stream<F>(&self, callback: F)
    where
        F: Fn(PeerId, RemoteStream) + Send + Sync + 'static,
    {
        *self.state.callbacks.on_remote_stream.lock().await = Some(Arc::new(callback));
    }

    /// Set the callback fired when the local source goes live
    pub async fn on_local_stream_ready<F>(&self, callback: F)
    where
        F: Fn(Vec<MediaTrack>) + Send + Sync + 'static,
    {
        *self.state.callbacks.on_local_stream_ready.lock().await = Some(Arc::new(callback));
    }

    /// Set the callback fired when a peer's session is removed
    pub async fn on_peer_removed<F>(&self, callback: F)
    where
        F: Fn(PeerId) + Send + Sync + 'static,
    {
        *self.state.callbacks.on_peer_removed.lock().await = Some(Arc::new(callback));
    }

    /// Set the callback for surfaced errors
    pub async fn on_error<F>(&self, callback: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        *self.state.callbacks.on_error.lock().await = Some(Arc::new(callback));
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Single task consuming relay events, transport notifications and the
    /// shutdown signal. Each handler runs to completion before the next
    /// event, which is what preserves the per-peer ordering guarantee.
    async fn event_loop(
        state: Arc<MeshState>,
        mut channel_rx: ChannelEvents,
        mut session_rx: mpsc::UnboundedReceiver<(PeerId, SessionEvent)>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                event = channel_rx.recv() => match event {
                    Some(ChannelEvent::Closed) | None => {
                        Self::handle_channel_closed(&state).await;
                        break;
                    }
                    Some(event) => Self::handle_channel_event(&state, event).await,
                },
                event = session_rx.recv() => match event {
                    Some((peer_id, event)) => {
                        Self::handle_session_event(&state, peer_id, event).await
                    }
                    None => break,
                },
            }
        }

        debug!("Mesh event loop terminated: local_id={}", state.local_id);
    }

    async fn handle_channel_event(state: &Arc<MeshState>, event: ChannelEvent) {
        match event {
            ChannelEvent::PeerDiscovered { peer_id } => {
                Self::handle_discovered(state, peer_id).await;
            }
            ChannelEvent::PeerDeparted { peer_id } => {
                Self::handle_departed(state, peer_id).await;
            }
            ChannelEvent::Message { from, message } => match message {
                PeerMessage::Ready => Self::handle_ready(state, from).await,
                PeerMessage::ReadyAck => Self::handle_ready_ack(state, from).await,
                PeerMessage::Signal { payload } => {
                    Self::handle_signal(state, from, payload).await
                }
            },
            // Matched in the loop before dispatch.
            ChannelEvent::Closed => {}
        }
    }

    /// A new peer is reachable: announce our readiness and wait for the
    /// acknowledgment that makes us the Receiver of the pair.
    async fn handle_discovered(state: &Arc<MeshState>, peer_id: PeerId) {
        if state.sessions.read().await.contains_key(&peer_id)
            || state.pending.read().await.contains(&peer_id)
        {
            debug!("Duplicate discovery for {}, ignoring", peer_id);
            return;
        }

        if Self::at_capacity(state).await {
            warn!(
                "Peer limit ({}) reached, ignoring discovery of {}",
                state.max_peers, peer_id
            );
            return;
        }

        debug!("Discovered peer {}, announcing readiness", peer_id);
        state.pending.write().await.insert(peer_id.clone());

        if let Err(e) = state.channel.send(&peer_id, PeerMessage::Ready).await {
            warn!("Failed to announce readiness to {}: {}", peer_id, e);
        }
    }

    /// A peer announced readiness to us: we become the Initiator of the
    /// pair — unless both sides announced simultaneously, which is resolved
    /// by ordering the two identifiers.
    async fn handle_ready(state: &Arc<MeshState>, from: PeerId) {
        if state.sessions.read().await.contains_key(&from) {
            debug!("Readiness from already-tracked peer {}, ignoring", from);
            return;
        }

        if state.pending.read().await.contains(&from) {
            // Both sides announced before either heard the other. The side
            // with the greater identifier acts on the incoming announcement;
            // the other keeps waiting for the acknowledgment its own
            // announcement will earn.
            if state.local_id <= from {
                debug!(
                    "Simultaneous announcement with {}, deferring to their acknowledgment",
                    from
                );
                return;
            }
            debug!("Simultaneous announcement with {}, taking initiator", from);
            state.pending.write().await.remove(&from);
        }

        if Self::at_capacity(state).await {
            warn!(
                "Peer limit ({}) reached, ignoring readiness from {}",
                state.max_peers, from
            );
            return;
        }

        if Self::create_session(state, from.clone(), SessionRole::Initiator).await {
            if let Err(e) = state.channel.send(&from, PeerMessage::ReadyAck).await {
                warn!("Failed to acknowledge readiness of {}: {}", from, e);
            }
        }
    }

    /// Our announcement was acknowledged: we become the Receiver of the pair.
    async fn handle_ready_ack(state: &Arc<MeshState>, from: PeerId) {
        if state.sessions.read().await.contains_key(&from) {
            debug!("Acknowledgment from already-tracked peer {}, ignoring", from);
            return;
        }

        if !state.pending.write().await.remove(&from) {
            warn!("Unsolicited readiness acknowledgment from {}, ignoring", from);
            return;
        }

        Self::create_session(state, from, SessionRole::Receiver).await;
    }

    /// Route an opaque payload to the matching session.
    async fn handle_signal(state: &Arc<MeshState>, from: PeerId, payload: SignalPayload) {
        let session = state.sessions.read().await.get(&from).cloned();

        let Some(session) = session else {
            // Legitimate after local cleanup: the signal outlived the session.
            warn!("Dropping orphaned signal from unknown peer {}", from);
            return;
        };

        if let Err(e) = session.accept_signal(payload).await {
            if e.is_fatal_for_peer() {
                Self::fail_session(state, &from, e).await;
            } else {
                warn!("Ignoring non-fatal signal error from {}: {}", from, e);
            }
        }
    }

    /// A peer departed: tear its session down if present.
    async fn handle_departed(state: &Arc<MeshState>, peer_id: PeerId) {
        state.pending.write().await.remove(&peer_id);
        if Self::teardown_session(state, &peer_id).await {
            info!("Peer departed: {}", peer_id);
        } else {
            debug!("Departure for unknown peer {}, ignoring", peer_id);
        }
    }

    /// The relay is gone: every current peer departs at once.
    async fn handle_channel_closed(state: &Arc<MeshState>) {
        let count = state.sessions.read().await.len();
        info!(
            "Signaling channel lost, tearing down {} session(s)",
            count
        );

        Self::teardown_all(state).await;
        state.pending.write().await.clear();

        let err = Error::ChannelLost("signaling channel closed".to_string());
        if let Some(cb) = state.callbacks.on_error.lock().await.as_ref() {
            cb(&err);
        }
    }

    async fn handle_session_event(state: &Arc<MeshState>, peer_id: PeerId, event: SessionEvent) {
        match event {
            SessionEvent::SignalProduced { payload } => {
                let session = state.sessions.read().await.get(&peer_id).cloned();
                let Some(session) = session else {
                    debug!("Discarding signal produced for removed peer {}", peer_id);
                    return;
                };

                session.note_signal_produced().await;
                if let Err(e) = state
                    .channel
                    .send(&peer_id, PeerMessage::Signal { payload })
                    .await
                {
                    // Best-effort: the relay owns retries, if any.
                    warn!("Failed to relay signal to {}: {}", peer_id, e);
                }
            }
            SessionEvent::StreamReceived { stream } => {
                let session = state.sessions.read().await.get(&peer_id).cloned();
                let Some(session) = session else {
                    debug!("Discarding stream for removed peer {}", peer_id);
                    return;
                };

                if session.set_inbound_stream(stream.clone()).await {
                    info!("Remote stream received from {}", peer_id);
                    if let Some(cb) = state.callbacks.on_remote_stream.lock().await.as_ref() {
                        cb(peer_id, stream);
                    }
                }
            }
            SessionEvent::Closed => {
                if Self::teardown_session(state, &peer_id).await {
                    debug!("Session {} closed by its transport", peer_id);
                }
            }
            SessionEvent::Error { error } => {
                Self::fail_session(state, &peer_id, error).await;
            }
        }
    }

    // ========================================================================
    // Session bookkeeping
    // ========================================================================

    async fn at_capacity(state: &Arc<MeshState>) -> bool {
        state.sessions.read().await.len() >= state.max_peers as usize
    }

    /// Create a session for `peer_id` with the given role and start its
    /// negotiation. Returns false if the transport could not be built.
    async fn create_session(state: &Arc<MeshState>, peer_id: PeerId, role: SessionRole) -> bool {
        let tracks = match state.media.read().await.as_ref() {
            Some(media) => media.snapshot(),
            None => Vec::new(),
        };

        let Some(ice) = state.ice.read().await.clone() else {
            warn!("No ICE configuration available, dropping peer {}", peer_id);
            return false;
        };

        let Some(session_tx) = state.session_tx.read().await.clone() else {
            return false;
        };

        let transport = match state
            .factory
            .create(&peer_id, ice, &tracks, session_tx)
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                let err =
                    Error::PeerConnectionFailed(format!("{}: transport creation: {}", peer_id, e));
                error!("{}", err);
                if let Some(cb) = state.callbacks.on_error.lock().await.as_ref() {
                    cb(&err);
                }
                return false;
            }
        };

        let session = Arc::new(PeerSession::new(peer_id.clone(), role, tracks, transport));
        state
            .sessions
            .write()
            .await
            .insert(peer_id.clone(), Arc::clone(&session));

        info!("Peer session created: peer={} role={:?}", peer_id, role);

        if let Err(e) = session.begin().await {
            Self::fail_session(state, &peer_id, e).await;
            return false;
        }

        true
    }

    /// Remove and close one session; fires the removal callback exactly once.
    async fn teardown_session(state: &Arc<MeshState>, peer_id: &str) -> bool {
        let removed = state.sessions.write().await.remove(peer_id);
        let Some(session) = removed else {
            return false;
        };

        session.close().await;

        if let Some(cb) = state.callbacks.on_peer_removed.lock().await.as_ref() {
            cb(peer_id.to_string());
        }
        true
    }

    /// Drain and close every session.
    async fn teardown_all(state: &Arc<MeshState>) {
        let drained: Vec<(PeerId, Arc<PeerSession>)> = {
            let mut sessions = state.sessions.write().await;
            sessions.drain().collect()
        };

        for (peer_id, session) in drained {
            session.close().await;
            if let Some(cb) = state.callbacks.on_peer_removed.lock().await.as_ref() {
                cb(peer_id);
            }
        }
    }

    /// Tear down one failing session and surface the failure; siblings are
    /// untouched.
    async fn fail_session(state: &Arc<MeshState>, peer_id: &str, cause: Error) {
        let had_session = Self::teardown_session(state, peer_id).await;

        let err = Error::PeerConnectionFailed(format!("{}: {}", peer_id, cause));
        error!("{}", err);

        if had_session {
            if let Some(cb) = state.callbacks.on_error.lock().await.as_ref() {
                cb(&err);
            }
        }
    }
}
