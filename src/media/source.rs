//! Local and remote media handles
//!
//! Tracks are opaque handles at this layer; frames and codecs live below the
//! session transport.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of media carried by a track
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// A single audio or video track handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTrack {
    /// Unique track identifier
    pub id: String,

    /// Kind of media this track carries
    pub kind: TrackKind,

    /// Human-readable label (device or capture source name)
    pub label: String,

    /// Whether the track is currently producing media.
    ///
    /// Advisory for the capture/render layer; toggling it never touches
    /// negotiation.
    pub enabled: bool,
}

impl MediaTrack {
    /// Create an enabled track with a fresh identifier
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            enabled: true,
        }
    }
}

/// Inbound media stream received from a remote peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStream {
    /// Stream identifier assigned by the remote side
    pub id: String,

    /// Tracks carried by the stream
    pub tracks: Vec<MediaTrack>,
}

/// The local outbound media source.
///
/// Holds at most one active track per kind; replacement swaps the track of
/// matching kind without changing membership. Exclusively owned by the mesh
/// manager; peer sessions only ever read snapshots.
#[derive(Debug, Default)]
pub struct LocalMediaSource {
    tracks: HashMap<TrackKind, MediaTrack>,
}

impl LocalMediaSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from a set of tracks.
    ///
    /// When several tracks share a kind, the last one wins.
    pub fn from_tracks(tracks: impl IntoIterator<Item = MediaTrack>) -> Self {
        let mut source = Self::new();
        for track in tracks {
            source.tracks.insert(track.kind, track);
        }
        source
    }

    /// Current track of the given kind, if any
    pub fn track(&self, kind: TrackKind) -> Option<&MediaTrack> {
        self.tracks.get(&kind)
    }

    /// Snapshot of the current tracks, audio first.
    ///
    /// Sessions attach this snapshot at creation; a session created after a
    /// replacement therefore observes the new track.
    pub fn snapshot(&self) -> Vec<MediaTrack> {
        let mut tracks: Vec<_> = self.tracks.values().cloned().collect();
        tracks.sort_by_key(|t| t.kind);
        tracks
    }

    /// Swap the track of matching kind, returning the replaced one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaTrackError`] if the source holds no track of
    /// that kind (membership never changes through replacement).
    pub fn replace(&mut self, new_track: MediaTrack) -> Result<MediaTrack> {
        match self.tracks.get_mut(&new_track.kind) {
            Some(slot) => Ok(std::mem::replace(slot, new_track)),
            None => Err(Error::MediaTrackError(format!(
                "no active {:?} track to replace",
                new_track.kind
            ))),
        }
    }

    /// Enable or disable the track of the given kind (microphone mute,
    /// camera off)
    pub fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> Result<bool> {
        match self.tracks.get_mut(&kind) {
            Some(track) => {
                track.enabled = enabled;
                Ok(enabled)
            }
            None => Err(Error::MediaTrackError(format!(
                "no active {:?} track",
                kind
            ))),
        }
    }

    /// Number of active tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the source holds no tracks
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
