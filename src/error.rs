//! Error types for the peer mesh

/// Result type alias using the mesh [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mesh signaling and connection lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The mesh manager was started twice without an intervening stop
    #[error("Mesh already started")]
    AlreadyStarted,

    /// An operation requiring a running mesh was called before start
    #[error("Mesh not started")]
    NotStarted,

    /// Capture device unavailable or permission denied
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// Signaling relay error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// Negotiation or transport failure for a single peer
    #[error("Peer connection failed: {0}")]
    PeerConnectionFailed(String),

    /// Relay connectivity lost; all sessions torn down
    #[error("Signaling channel lost: {0}")]
    ChannelLost(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is fatal for the peer session it occurred on.
    ///
    /// Fatal errors tear the session down; non-fatal ones (a single bad ICE
    /// candidate, a malformed payload) are logged and the session continues.
    pub fn is_fatal_for_peer(&self) -> bool {
        !matches!(
            self,
            Error::IceCandidateError(_) | Error::SerializationError(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}
