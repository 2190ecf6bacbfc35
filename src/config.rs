//! Configuration types for the peer mesh

use serde::{Deserialize, Serialize};

/// Main configuration for a mesh participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// WebSocket signaling relay URL (ws:// or wss://)
    pub signaling_url: String,

    /// Local peer ID (auto-generated if None)
    pub peer_id: Option<String>,

    /// Maximum peers in mesh (default: 10, max: 10)
    pub max_peers: u32,

    /// ICE servers handed to every peer connection
    pub ice: IceConfig,

    /// Capture constraints for the local media source
    pub media: MediaConstraints,
}

/// STUN/TURN server set, loaded once at startup and shared read-only by all
/// peer connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    /// Server descriptors, tried in order
    pub servers: Vec<IceServerConfig>,
}

/// A single STUN or TURN server descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URL (stun:, turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Credential for TURN authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Create a STUN server entry (no credentials)
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    /// Create a TURN server entry with credentials
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// Capture constraints handed to the media acquisition capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Request an audio track
    pub audio: bool,

    /// Request a video track with the given limits; None for audio-only
    pub video: Option<VideoConstraints>,
}

/// Video capture limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConstraints {
    /// Maximum frame width in pixels
    pub max_width: u32,

    /// Maximum frame height in pixels
    pub max_height: u32,

    /// Maximum frame rate in frames per second
    pub max_frame_rate: u32,

    /// Preferred camera facing direction
    pub facing_mode: FacingMode,
}

/// Camera facing preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Front-facing camera
    User,
    /// Rear-facing camera
    Environment,
}

impl FacingMode {
    /// The opposite facing direction (camera flip)
    pub fn flipped(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            peer_id: None,
            max_peers: 10,
            ice: IceConfig::default(),
            media: MediaConstraints::default(),
        }
    }
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec![IceServerConfig::stun("stun:stun.l.google.com:19302")],
        }
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints::default()),
        }
    }
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            max_frame_rate: 15,
            facing_mode: FacingMode::User,
        }
    }
}

impl IceConfig {
    /// Validate the server set
    ///
    /// # Errors
    ///
    /// Returns an error if the set is empty, a URL carries an unknown scheme,
    /// or a TURN entry is missing credentials.
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one ICE server is required".to_string(),
            ));
        }

        for server in &self.servers {
            let is_turn = server.url.starts_with("turn:") || server.url.starts_with("turns:");
            if !is_turn && !server.url.starts_with("stun:") {
                return Err(Error::InvalidConfig(format!(
                    "ICE server URL must start with stun:, turn: or turns:, got {}",
                    server.url
                )));
            }
            if is_turn && (server.username.is_none() || server.credential.is_none()) {
                return Err(Error::InvalidConfig(format!(
                    "TURN server {} requires username and credential",
                    server.url
                )));
            }
        }

        Ok(())
    }
}

impl MeshConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a WebSocket URL
    /// - `max_peers` is not in range 1-10
    /// - the ICE server set fails [`IceConfig::validate`]
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.max_peers == 0 || self.max_peers > 10 {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-10, got {}",
                self.max_peers
            )));
        }

        self.ice.validate()?;

        Ok(())
    }
}
