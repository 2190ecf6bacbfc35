//! WebRTC-backed session transport

use crate::config::IceConfig;
use crate::error::{Error, Result};
use crate::media::{MediaTrack, RemoteStream, TrackKind};
use crate::signaling::SignalPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::session::SessionRole;
use super::transport::{SessionEvent, SessionEventSender, SessionTransport, TransportFactory};

/// Wire form of the opaque payload exchanged between two [`RtcTransport`]s.
///
/// Only this layer interprets it; the mesh routes it blind.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NegotiationPayload {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: RTCIceCandidateInit },
}

fn encode_payload(payload: &NegotiationPayload) -> Result<SignalPayload> {
    serde_json::to_value(payload)
        .map(SignalPayload::new)
        .map_err(|e| Error::SerializationError(format!("Failed to encode payload: {}", e)))
}

fn decode_payload(payload: SignalPayload) -> Result<NegotiationPayload> {
    serde_json::from_value(payload.into_inner())
        .map_err(|e| Error::SerializationError(format!("Failed to decode payload: {}", e)))
}

fn codec_capability(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90000,
            ..Default::default()
        },
    }
}

/// Session transport wrapping a `webrtc::RTCPeerConnection`.
///
/// Offers, answers and trickled ICE candidates travel as opaque payloads;
/// remote media arrival and fatal connection failures surface as session
/// events.
pub struct RtcTransport {
    /// Remote peer this connection belongs to
    peer_id: String,

    /// The underlying peer connection
    pc: Arc<RTCPeerConnection>,

    /// Retained RTP senders, one per outbound track kind; the handles
    /// [`replace_track`](SessionTransport::replace_track) swaps on
    senders: HashMap<TrackKind, Arc<RTCRtpSender>>,

    /// Candidates that arrived before the remote description
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,

    /// Event sender into the mesh loop
    events: SessionEventSender,
}

impl RtcTransport {
    /// Create a peer connection with the given ICE servers and local tracks.
    pub async fn new(
        peer_id: &str,
        ice: Arc<IceConfig>,
        tracks: &[MediaTrack],
        events: SessionEventSender,
    ) -> Result<Arc<Self>> {
        info!("Creating RTC transport: peer_id={}", peer_id);

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| Error::WebRtcError(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = ice
            .servers
            .iter()
            .map(|server| RTCIceServer {
                urls: vec![server.url.clone()],
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?);

        // Attach the local track snapshot; the senders stay around so a later
        // replacement swaps media without renegotiating.
        let mut senders = HashMap::new();
        for track in tracks {
            let local = Arc::new(TrackLocalStaticSample::new(
                codec_capability(track.kind),
                track.id.clone(),
                format!("mesh-{}", peer_id),
            ));
            let sender = pc
                .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| {
                    Error::MediaTrackError(format!("Failed to add {:?} track: {}", track.kind, e))
                })?;
            senders.insert(track.kind, sender);
        }

        let transport = Arc::new(Self {
            peer_id: peer_id.to_string(),
            pc,
            senders,
            pending_candidates: Mutex::new(Vec::new()),
            events,
        });

        transport.register_callbacks();

        Ok(transport)
    }

    /// Wire the connection callbacks into session events.
    fn register_callbacks(&self) {
        // Trickled ICE candidates become outbound payloads.
        let peer_id = self.peer_id.clone();
        let events = self.events.clone();
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            let peer_id = peer_id.clone();
            let events = events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        match encode_payload(&NegotiationPayload::Candidate { candidate: init }) {
                            Ok(payload) => {
                                let _ = events
                                    .send((peer_id, SessionEvent::SignalProduced { payload }));
                            }
                            Err(e) => {
                                warn!("Failed to encode ICE candidate for {}: {}", peer_id, e)
                            }
                        }
                    }
                    Err(e) => warn!("Failed to serialize ICE candidate for {}: {}", peer_id, e),
                }
            })
        }));

        // First remote track materializes the inbound stream.
        let peer_id = self.peer_id.clone();
        let events = self.events.clone();
        let stream_emitted = Arc::new(AtomicBool::new(false));
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let peer_id = peer_id.clone();
            let events = events.clone();
            let stream_emitted = Arc::clone(&stream_emitted);
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => {
                        debug!("Ignoring track of unspecified kind from {}", peer_id);
                        return;
                    }
                };

                if stream_emitted.swap(true, Ordering::SeqCst) {
                    debug!(
                        "Additional {:?} track from {} folded into existing stream",
                        kind, peer_id
                    );
                    return;
                }

                let stream_id = track.stream_id();
                let stream = RemoteStream {
                    id: stream_id.clone(),
                    tracks: vec![MediaTrack {
                        id: track.id(),
                        kind,
                        label: stream_id,
                        enabled: true,
                    }],
                };

                let _ = events.send((peer_id, SessionEvent::StreamReceived { stream }));
            })
        }));

        // Fatal connection failures and remote closure surface upward; the
        // connected milestone is driven by track arrival, not by this state.
        let peer_id = self.peer_id.clone();
        let events = self.events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let peer_id = peer_id.clone();
                let events = events.clone();
                Box::pin(async move {
                    debug!("Peer {} connection state: {:?}", peer_id, s);
                    match s {
                        RTCPeerConnectionState::Failed => {
                            let _ = events.send((
                                peer_id.clone(),
                                SessionEvent::Error {
                                    error: Error::WebRtcError(
                                        "connection entered failed state".to_string(),
                                    ),
                                },
                            ));
                        }
                        RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Closed => {
                            let _ = events.send((peer_id.clone(), SessionEvent::Closed));
                        }
                        _ => {}
                    }
                })
            }));
    }

    /// Emit an outbound negotiation payload to the mesh loop.
    fn emit_signal(&self, payload: &NegotiationPayload) -> Result<()> {
        let payload = encode_payload(payload)?;
        if self
            .events
            .send((self.peer_id.clone(), SessionEvent::SignalProduced { payload }))
            .is_err()
        {
            debug!("Session event receiver dropped for {}", self.peer_id);
        }
        Ok(())
    }

    /// Apply candidates that raced ahead of the remote description.
    async fn drain_pending_candidates(&self) {
        let queued: Vec<RTCIceCandidateInit> = {
            let mut pending = self.pending_candidates.lock().await;
            pending.drain(..).collect()
        };

        for candidate in queued {
            if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                warn!(
                    "Failed to add queued ICE candidate for {}: {}",
                    self.peer_id, e
                );
            }
        }
    }
}

#[async_trait]
impl SessionTransport for RtcTransport {
    async fn begin(&self, role: SessionRole) -> Result<()> {
        match role {
            SessionRole::Initiator => {
                let offer = self
                    .pc
                    .create_offer(None)
                    .await
                    .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

                self.pc.set_local_description(offer).await.map_err(|e| {
                    Error::SdpError(format!("Failed to set local description: {}", e))
                })?;

                let local = self.pc.local_description().await.ok_or_else(|| {
                    Error::SdpError("No local description after setting offer".to_string())
                })?;

                debug!("Created SDP offer for peer {}", self.peer_id);
                self.emit_signal(&NegotiationPayload::Offer { sdp: local.sdp })
            }
            // The receiver waits for the initiator's offer.
            SessionRole::Receiver => Ok(()),
        }
    }

    async fn accept_signal(&self, payload: SignalPayload) -> Result<()> {
        match decode_payload(payload)? {
            NegotiationPayload::Offer { sdp } => {
                let offer = RTCSessionDescription::offer(sdp)
                    .map_err(|e| Error::SdpError(format!("Failed to parse offer: {}", e)))?;

                self.pc.set_remote_description(offer).await.map_err(|e| {
                    Error::SdpError(format!("Failed to set remote description: {}", e))
                })?;
                self.drain_pending_candidates().await;

                let answer = self
                    .pc
                    .create_answer(None)
                    .await
                    .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

                self.pc.set_local_description(answer).await.map_err(|e| {
                    Error::SdpError(format!("Failed to set local description: {}", e))
                })?;

                let local = self.pc.local_description().await.ok_or_else(|| {
                    Error::SdpError("No local description after setting answer".to_string())
                })?;

                debug!("Created SDP answer for peer {}", self.peer_id);
                self.emit_signal(&NegotiationPayload::Answer { sdp: local.sdp })
            }
            NegotiationPayload::Answer { sdp } => {
                let answer = RTCSessionDescription::answer(sdp)
                    .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e)))?;

                self.pc.set_remote_description(answer).await.map_err(|e| {
                    Error::SdpError(format!("Failed to set remote description: {}", e))
                })?;
                self.drain_pending_candidates().await;
                Ok(())
            }
            NegotiationPayload::Candidate { candidate } => {
                if self.pc.remote_description().await.is_none() {
                    // Candidate raced ahead of the SDP; hold it until the
                    // remote description lands.
                    self.pending_candidates.lock().await.push(candidate);
                    return Ok(());
                }

                self.pc.add_ice_candidate(candidate).await.map_err(|e| {
                    Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e))
                })
            }
        }
    }

    async fn replace_track(&self, track: MediaTrack) -> Result<()> {
        let sender = self.senders.get(&track.kind).ok_or_else(|| {
            Error::MediaTrackError(format!("No {:?} sender on this connection", track.kind))
        })?;

        let local = Arc::new(TrackLocalStaticSample::new(
            codec_capability(track.kind),
            track.id.clone(),
            format!("mesh-{}", self.peer_id),
        ));

        sender
            .replace_track(Some(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>))
            .await
            .map_err(|e| {
                Error::MediaTrackError(format!("Failed to replace {:?} track: {}", track.kind, e))
            })?;

        debug!("Replaced {:?} track for peer {}", track.kind, self.peer_id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing RTC transport for peer {}", self.peer_id);
        self.pc
            .close()
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to close peer connection: {}", e)))
    }
}

/// Factory producing [`RtcTransport`]s
#[derive(Debug, Default)]
pub struct RtcFactory;

impl RtcFactory {
    /// Create the factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for RtcFactory {
    async fn create(
        &self,
        peer_id: &str,
        ice: Arc<IceConfig>,
        tracks: &[MediaTrack],
        events: SessionEventSender,
    ) -> Result<Arc<dyn SessionTransport>> {
        let transport = RtcTransport::new(peer_id, ice, tracks, events).await?;
        Ok(transport as Arc<dyn SessionTransport>)
    }
}
