//! WebSocket signaling channel
//!
//! Relay adapter speaking the JSON wire protocol from
//! [`protocol`](super::protocol) over a WebSocket connection.

use super::channel::{ChannelEventSender, ChannelEvents, SignalingChannel};
use super::protocol::{
    ChannelEvent, PeerAnnounceParams, PeerId, PeerMessage, PeerSignalParams, RelayMessage,
};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Signaling channel backed by a WebSocket connection to the relay
pub struct WebSocketChannel {
    /// Relay URL
    url: String,

    /// Local peer ID used as the sender on directed messages
    local_id: PeerId,

    /// Outgoing message sender
    tx: mpsc::UnboundedSender<Message>,
}

impl WebSocketChannel {
    /// Connect to the relay and announce the local participant.
    ///
    /// Establishes the WebSocket connection, starts background tasks for
    /// sending and receiving, and returns the channel together with the
    /// event stream to hand to the mesh manager.
    pub async fn connect(url: &str, local_id: &str) -> Result<(Self, ChannelEvents)> {
        info!("Connecting to signaling relay: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling relay");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, event_tx));

        let channel = Self {
            url: url.to_string(),
            local_id: local_id.to_string(),
            tx,
        };

        channel.queue_message(RelayMessage::PeerAnnounce {
            params: PeerAnnounceParams {
                peer_id: local_id.to_string(),
            },
        })?;

        Ok((channel, event_rx))
    }

    /// Relay URL this channel is connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sender task: drains queued messages into the WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }

        debug!("Sender task terminated");
    }

    /// Receiver task: parses relay messages into channel events
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        events: ChannelEventSender,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    if let Err(e) = Self::handle_message(&text, &events) {
                        warn!("Failed to handle relay message: {}", e);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Relay connection closed");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        // Either the relay closed the socket or the transport failed; the
        // mesh treats both as losing every peer at once.
        let _ = events.send(ChannelEvent::Closed);

        debug!("Receiver task terminated");
    }

    /// Map one relay message onto a channel event
    fn handle_message(text: &str, events: &ChannelEventSender) -> Result<()> {
        debug!("Received relay message: {}", text);

        let event = match RelayMessage::from_json(text)? {
            RelayMessage::PeerJoined { params } => ChannelEvent::PeerDiscovered {
                peer_id: params.peer_id,
            },
            RelayMessage::PeerLeft { params } => ChannelEvent::PeerDeparted {
                peer_id: params.peer_id,
            },
            RelayMessage::PeerSignal { params } => ChannelEvent::Message {
                from: params.from,
                message: params.message,
            },
            RelayMessage::PeerAnnounce { params } => {
                warn!("Unexpected announce from relay for {}", params.peer_id);
                return Ok(());
            }
        };

        events
            .send(event)
            .map_err(|_| Error::SignalingError("channel event receiver dropped".to_string()))
    }

    /// Queue a relay message for the sender task
    fn queue_message(&self, msg: RelayMessage) -> Result<()> {
        let json = msg.to_json()?;
        debug!("Sending relay message: {}", json);

        self.tx
            .send(Message::Text(json))
            .map_err(|e| Error::SignalingError(format!("Failed to queue message: {}", e)))
    }
}

#[async_trait]
impl SignalingChannel for WebSocketChannel {
    async fn send(&self, to: &str, message: PeerMessage) -> Result<()> {
        self.queue_message(RelayMessage::PeerSignal {
            params: PeerSignalParams {
                from: self.local_id.clone(),
                to: to.to_string(),
                message,
            },
        })
    }
}
