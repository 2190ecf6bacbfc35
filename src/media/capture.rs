//! Media acquisition capability
//!
//! Capture is an external collaborator: the host environment owns devices and
//! frames, this crate only consumes the resulting track handles.

use super::source::{LocalMediaSource, MediaTrack, TrackKind};
use crate::config::MediaConstraints;
use crate::{Error, Result};
use async_trait::async_trait;

/// Capability that yields local media for the given constraints.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Acquire camera/microphone media honoring `constraints`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAcquisition`] when the device is unavailable or
    /// permission is denied; the caller surfaces this, never retries
    /// silently.
    async fn acquire_local_media(&self, constraints: &MediaConstraints)
        -> Result<LocalMediaSource>;

    /// Acquire a screen capture. A distinct capability from camera capture;
    /// video only, no facing mode.
    async fn acquire_display_media(&self) -> Result<LocalMediaSource>;
}

/// Capture source that fabricates placeholder tracks.
///
/// Produces no frames; useful for tests and headless runs where the mesh
/// lifecycle matters but real devices do not exist.
#[derive(Debug, Default)]
pub struct SyntheticCapture {
    denied: bool,
}

impl SyntheticCapture {
    /// A capture source that grants every request
    pub fn new() -> Self {
        Self::default()
    }

    /// A capture source that denies every request, for exercising the
    /// acquisition failure path
    pub fn denied() -> Self {
        Self { denied: true }
    }
}

#[async_trait]
impl MediaCapture for SyntheticCapture {
    async fn acquire_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaSource> {
        if self.denied {
            return Err(Error::MediaAcquisition("capture denied".to_string()));
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, "synthetic-audio"));
        }
        if let Some(video) = &constraints.video {
            tracks.push(MediaTrack::new(
                TrackKind::Video,
                format!(
                    "synthetic-video-{}x{}@{}-{:?}",
                    video.max_width, video.max_height, video.max_frame_rate, video.facing_mode
                ),
            ));
        }

        Ok(LocalMediaSource::from_tracks(tracks))
    }

    async fn acquire_display_media(&self) -> Result<LocalMediaSource> {
        if self.denied {
            return Err(Error::MediaAcquisition("capture denied".to_string()));
        }

        Ok(LocalMediaSource::from_tracks([MediaTrack::new(
            TrackKind::Video,
            "synthetic-display",
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_honors_constraints() {
        let capture = SyntheticCapture::new();

        let source = capture
            .acquire_local_media(&MediaConstraints::default())
            .await
            .unwrap();
        assert!(source.track(TrackKind::Audio).is_some());
        assert!(source.track(TrackKind::Video).is_some());

        let audio_only = MediaConstraints {
            audio: true,
            video: None,
        };
        let source = capture.acquire_local_media(&audio_only).await.unwrap();
        assert!(source.track(TrackKind::Audio).is_some());
        assert!(source.track(TrackKind::Video).is_none());
    }

    #[tokio::test]
    async fn test_display_media_is_video_only() {
        let capture = SyntheticCapture::new();
        let source = capture.acquire_display_media().await.unwrap();

        assert!(source.track(TrackKind::Audio).is_none());
        assert!(source.track(TrackKind::Video).is_some());
    }

    #[tokio::test]
    async fn test_denied_capture_surfaces_acquisition_error() {
        let capture = SyntheticCapture::denied();

        let result = capture.acquire_local_media(&MediaConstraints::default()).await;
        assert!(matches!(result, Err(Error::MediaAcquisition(_))));

        let result = capture.acquire_display_media().await;
        assert!(matches!(result, Err(Error::MediaAcquisition(_))));
    }
}
