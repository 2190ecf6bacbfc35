//! Media track handles and acquisition

pub mod capture;
pub mod source;

pub use capture::{MediaCapture, SyntheticCapture};
pub use source::{LocalMediaSource, MediaTrack, RemoteStream, TrackKind};
