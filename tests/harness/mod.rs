//! Mesh test harness
//!
//! Provides infrastructure for integration testing of the peer mesh:
//! - A script-driven relay whose deliveries the test pumps in seeded-random
//!   order (per-pair FIFO preserved), for interleaving coverage
//! - A scripted session transport that completes negotiation without a real
//!   media stack
//! - An event-collecting observer and polling assertion helpers

#![allow(dead_code)]

use async_trait::async_trait;
use peermesh::{
    ChannelEvent, ChannelEventSender, ChannelEvents, Error, IceConfig, LocalMediaSource,
    MediaTrack, MeshConfig, PeerId, PeerMessage, PeerMeshManager, RemoteStream, Result,
    SessionEvent, SessionEventSender, SessionRole, SessionTransport, SignalPayload,
    SignalingChannel, TrackKind, TransportFactory,
};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Initialize test logging once
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Poll an async condition until it holds or the deadline passes
pub async fn wait_until<F, Fut>(what: &str, f: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if f().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Script-driven relay
// ============================================================================

struct TestRelayInner {
    inboxes: Mutex<HashMap<PeerId, ChannelEventSender>>,
    /// Undelivered directed messages, FIFO per (sender, recipient) pair
    queues: Mutex<HashMap<(PeerId, PeerId), VecDeque<PeerMessage>>>,
    sends: AtomicUsize,
}

/// Relay whose message deliveries are pumped manually by the test, in
/// seeded-random order across pairs while preserving each pair's FIFO.
pub struct TestRelay {
    inner: Arc<TestRelayInner>,
}

/// Per-participant send handle for [`TestRelay`]
pub struct TestRelayHandle {
    local_id: PeerId,
    inner: Arc<TestRelayInner>,
}

impl Default for TestRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRelay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TestRelayInner {
                inboxes: Mutex::new(HashMap::new()),
                queues: Mutex::new(HashMap::new()),
                sends: AtomicUsize::new(0),
            }),
        }
    }

    /// Register a participant; no discovery events are generated — tests
    /// inject lifecycle events explicitly.
    pub fn register(&self, peer_id: &str) -> (Arc<TestRelayHandle>, ChannelEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .inboxes
            .lock()
            .unwrap()
            .insert(peer_id.to_string(), tx);

        let handle = Arc::new(TestRelayHandle {
            local_id: peer_id.to_string(),
            inner: Arc::clone(&self.inner),
        });
        (handle, rx)
    }

    /// Deliver a lifecycle event straight to a participant's inbox
    pub fn inject(&self, to: &str, event: ChannelEvent) {
        if let Some(tx) = self.inner.inboxes.lock().unwrap().get(to) {
            let _ = tx.send(event);
        }
    }

    /// Total number of directed sends observed
    pub fn sends(&self) -> usize {
        self.inner.sends.load(Ordering::SeqCst)
    }

    /// Whether any directed message is still undelivered
    pub fn has_pending(&self) -> bool {
        self.inner
            .queues
            .lock()
            .unwrap()
            .values()
            .any(|q| !q.is_empty())
    }

    /// Deliver one queued message from a randomly chosen pair; returns false
    /// when nothing is pending.
    pub fn deliver_one(&self, rng: &mut StdRng) -> bool {
        let (from, to, message) = {
            let mut queues = self.inner.queues.lock().unwrap();
            let mut keys: Vec<_> = queues
                .iter()
                .filter(|(_, q)| !q.is_empty())
                .map(|(k, _)| k.clone())
                .collect();
            if keys.is_empty() {
                return false;
            }
            keys.sort();
            let key = keys[rng.gen_range(0..keys.len())].clone();
            let message = queues.get_mut(&key).unwrap().pop_front().unwrap();
            (key.0, key.1, message)
        };

        if let Some(tx) = self.inner.inboxes.lock().unwrap().get(&to) {
            let _ = tx.send(ChannelEvent::Message { from, message });
        }
        true
    }

    /// Pump until the relay and the mesh loops reach quiescence
    pub async fn pump(&self, rng: &mut StdRng) {
        loop {
            let delivered = self.deliver_one(rng);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !delivered && !self.has_pending() {
                // One extra settle round: the last delivery may still be
                // producing replies inside a mesh loop.
                tokio::time::sleep(Duration::from_millis(50)).await;
                if !self.has_pending() {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl SignalingChannel for TestRelayHandle {
    async fn send(&self, to: &str, message: PeerMessage) -> Result<()> {
        self.inner.sends.fetch_add(1, Ordering::SeqCst);
        self.inner
            .queues
            .lock()
            .unwrap()
            .entry((self.local_id.clone(), to.to_string()))
            .or_default()
            .push_back(message);
        Ok(())
    }
}

// ============================================================================
// Scripted session transport
// ============================================================================

/// Transport that completes a one-round negotiation without a media stack.
///
/// The initiator's `begin` produces an "offer"; the recipient answers and
/// reports its stream; the initiator reports its stream on the answer. A
/// payload of kind "poison" fails fatally.
pub struct FakeTransport {
    pub peer_id: PeerId,
    pub attached: Vec<MediaTrack>,
    pub calls: Mutex<Vec<String>>,
    events: SessionEventSender,
}

impl FakeTransport {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send((self.peer_id.clone(), event));
    }

    fn stream(&self) -> RemoteStream {
        RemoteStream {
            id: format!("stream-{}", self.peer_id),
            tracks: vec![MediaTrack::new(TrackKind::Video, "remote")],
        }
    }
}

#[async_trait]
impl SessionTransport for FakeTransport {
    async fn begin(&self, role: SessionRole) -> Result<()> {
        self.record(format!("begin:{:?}", role));
        if role == SessionRole::Initiator {
            self.emit(SessionEvent::SignalProduced {
                payload: SignalPayload::new(serde_json::json!({"kind": "offer"})),
            });
        }
        Ok(())
    }

    async fn accept_signal(&self, payload: SignalPayload) -> Result<()> {
        let kind = payload.0["kind"].as_str().unwrap_or("unknown").to_string();
        self.record(format!("accept:{}", kind));

        match kind.as_str() {
            "offer" => {
                self.emit(SessionEvent::SignalProduced {
                    payload: SignalPayload::new(serde_json::json!({"kind": "answer"})),
                });
                self.emit(SessionEvent::StreamReceived {
                    stream: self.stream(),
                });
                Ok(())
            }
            "answer" => {
                self.emit(SessionEvent::StreamReceived {
                    stream: self.stream(),
                });
                Ok(())
            }
            "poison" => Err(Error::SdpError("scripted negotiation failure".to_string())),
            _ => Ok(()),
        }
    }

    async fn replace_track(&self, track: MediaTrack) -> Result<()> {
        self.record(format!("replace:{:?}:{}", track.kind, track.id));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record("close");
        Ok(())
    }
}

/// Factory handing out [`FakeTransport`]s and keeping them inspectable
#[derive(Default)]
pub struct FakeFactory {
    pub created: Mutex<Vec<Arc<FakeTransport>>>,
}

impl FakeFactory {
    /// The most recent transport created for `peer_id`
    pub fn transport_for(&self, peer_id: &str) -> Option<Arc<FakeTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|t| t.peer_id == peer_id)
            .cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn create(
        &self,
        peer_id: &str,
        _ice: Arc<IceConfig>,
        tracks: &[MediaTrack],
        events: SessionEventSender,
    ) -> Result<Arc<dyn SessionTransport>> {
        let transport = Arc::new(FakeTransport {
            peer_id: peer_id.to_string(),
            attached: tracks.to_vec(),
            calls: Mutex::new(Vec::new()),
            events,
        });
        self.created.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport as Arc<dyn SessionTransport>)
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Collects consumer-facing notifications for assertions
#[derive(Default)]
pub struct EventLog {
    pub remote_streams: Mutex<Vec<(PeerId, RemoteStream)>>,
    pub removed: Mutex<Vec<PeerId>>,
    pub errors: Mutex<Vec<String>>,
    pub local_ready: Mutex<Vec<usize>>,
}

/// Subscribe an [`EventLog`] to every consumer callback of a mesh
pub async fn attach_log(log: &Arc<EventLog>, mesh: &PeerMeshManager) {
    let l = Arc::clone(log);
    mesh.on_remote_stream(move |peer, stream| {
        l.remote_streams.lock().unwrap().push((peer, stream));
    })
    .await;

    let l = Arc::clone(log);
    mesh.on_local_stream_ready(move |tracks| {
        l.local_ready.lock().unwrap().push(tracks.len());
    })
    .await;

    let l = Arc::clone(log);
    mesh.on_peer_removed(move |peer| {
        l.removed.lock().unwrap().push(peer);
    })
    .await;

    let l = Arc::clone(log);
    mesh.on_error(move |error| {
        l.errors.lock().unwrap().push(error.to_string());
    })
    .await;
}

impl EventLog {
    pub fn stream_count(&self) -> usize {
        self.remote_streams.lock().unwrap().len()
    }

    pub fn removed_peers(&self) -> Vec<PeerId> {
        self.removed.lock().unwrap().clone()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

// ============================================================================
// Mesh construction
// ============================================================================

/// A mesh participant wired to fakes, ready for assertions
pub struct TestMesh {
    pub mesh: PeerMeshManager,
    pub factory: Arc<FakeFactory>,
    pub log: Arc<EventLog>,
}

impl TestMesh {
    pub async fn role_of(&self, peer_id: &str) -> Option<SessionRole> {
        self.mesh
            .list_peers()
            .await
            .into_iter()
            .find(|p| p.peer_id == peer_id)
            .map(|p| p.role)
    }
}

/// Default local source: one microphone track, one camera track
pub fn default_media() -> LocalMediaSource {
    LocalMediaSource::from_tracks([
        MediaTrack::new(TrackKind::Audio, "microphone"),
        MediaTrack::new(TrackKind::Video, "camera"),
    ])
}

/// Build and start a mesh participant over an already-created channel
pub async fn start_mesh(
    id: &str,
    channel: Arc<dyn SignalingChannel>,
    events: ChannelEvents,
    media: LocalMediaSource,
) -> TestMesh {
    let config = MeshConfig {
        peer_id: Some(id.to_string()),
        ..Default::default()
    };

    let factory = Arc::new(FakeFactory::default());
    let mesh = PeerMeshManager::new(&config, channel, Arc::clone(&factory) as Arc<dyn TransportFactory>)
        .expect("valid config");

    let log = Arc::new(EventLog::default());
    attach_log(&log, &mesh).await;

    mesh.start(media, Arc::new(IceConfig::default()), events)
        .await
        .expect("start");

    TestMesh { mesh, factory, log }
}

/// Register with a [`TestRelay`] and start a participant
pub async fn start_on_test_relay(relay: &TestRelay, id: &str) -> TestMesh {
    let (handle, events) = relay.register(id);
    start_mesh(id, handle as Arc<dyn SignalingChannel>, events, default_media()).await
}
