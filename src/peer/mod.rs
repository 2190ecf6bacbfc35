//! Peer session lifecycle and mesh management
//!
//! One [`PeerSession`] per discovered peer, driven by the
//! [`PeerMeshManager`]'s event loop; the negotiation engine below each
//! session sits behind the [`SessionTransport`] seam.

pub mod mesh;
pub mod rtc;
pub mod session;
pub mod transport;

pub use mesh::{PeerInfo, PeerMeshManager};
pub use rtc::{RtcFactory, RtcTransport};
pub use session::{PeerSession, SessionRole, SessionState};
pub use transport::{SessionEvent, SessionEventSender, SessionTransport, TransportFactory};
