//! Session lifecycle: discovery, departure, channel loss, isolation

mod harness;

use harness::*;
use peermesh::{
    ChannelEvent, LocalRelay, PeerMessage, SessionState, SignalPayload, SignalingChannel,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// The live-session map equals exactly the set of peers whose last lifecycle
/// event was a discovery.
#[tokio::test]
async fn test_live_sessions_mirror_lifecycle_events() {
    init_logging();
    let relay = TestRelay::new();
    let a = start_on_test_relay(&relay, "peer-a").await;
    let mut rng = StdRng::seed_from_u64(1);

    // Discover b: announce goes out, the acknowledgment completes the pair.
    relay.inject(
        "peer-a",
        ChannelEvent::PeerDiscovered {
            peer_id: "peer-b".to_string(),
        },
    );
    relay.pump(&mut rng).await;
    relay.inject(
        "peer-a",
        ChannelEvent::Message {
            from: "peer-b".to_string(),
            message: PeerMessage::ReadyAck,
        },
    );
    wait_until("session with b", || async {
        a.mesh.session_count().await == 1
    })
    .await;

    // c announces readiness to us directly.
    relay.inject(
        "peer-a",
        ChannelEvent::Message {
            from: "peer-c".to_string(),
            message: PeerMessage::Ready,
        },
    );
    wait_until("session with c", || async {
        a.mesh.session_count().await == 2
    })
    .await;

    // b departs; c stays.
    relay.inject(
        "peer-a",
        ChannelEvent::PeerDeparted {
            peer_id: "peer-b".to_string(),
        },
    );
    wait_until("b removed", || async { a.mesh.session_count().await == 1 }).await;
    assert_eq!(a.log.removed_peers(), vec!["peer-b".to_string()]);

    // Departure of an unknown peer is a no-op.
    relay.inject(
        "peer-a",
        ChannelEvent::PeerDeparted {
            peer_id: "peer-ghost".to_string(),
        },
    );
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(a.mesh.session_count().await, 1);
    assert_eq!(a.log.removed_peers().len(), 1);

    // Channel loss: every remaining peer departs at once.
    relay.inject("peer-a", ChannelEvent::Closed);
    wait_until("all sessions gone", || async {
        a.mesh.session_count().await == 0
    })
    .await;
    assert_eq!(a.log.removed_peers().len(), 2);
    let errors = a.log.error_messages();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("channel lost"));
}

#[tokio::test]
async fn test_duplicate_discovery_is_noop() {
    init_logging();
    let relay = TestRelay::new();
    let a = start_on_test_relay(&relay, "peer-a").await;
    let mut rng = StdRng::seed_from_u64(2);

    relay.inject(
        "peer-a",
        ChannelEvent::PeerDiscovered {
            peer_id: "peer-b".to_string(),
        },
    );
    // Duplicate while the announcement is still pending.
    relay.inject(
        "peer-a",
        ChannelEvent::PeerDiscovered {
            peer_id: "peer-b".to_string(),
        },
    );
    relay.pump(&mut rng).await;
    assert_eq!(relay.sends(), 1, "only one readiness announcement");

    relay.inject(
        "peer-a",
        ChannelEvent::Message {
            from: "peer-b".to_string(),
            message: PeerMessage::ReadyAck,
        },
    );
    wait_until("session with b", || async {
        a.mesh.session_count().await == 1
    })
    .await;

    // Duplicate for an already-tracked peer.
    relay.inject(
        "peer-a",
        ChannelEvent::PeerDiscovered {
            peer_id: "peer-b".to_string(),
        },
    );
    relay.pump(&mut rng).await;
    assert_eq!(a.mesh.session_count().await, 1);
    assert_eq!(relay.sends(), 1);
    assert_eq!(a.factory.created_count(), 1, "session never created twice");
}

#[tokio::test]
async fn test_orphaned_signal_is_dropped() {
    init_logging();
    let relay = TestRelay::new();
    let a = start_on_test_relay(&relay, "peer-a").await;

    relay.inject(
        "peer-a",
        ChannelEvent::Message {
            from: "peer-ghost".to_string(),
            message: PeerMessage::Signal {
                payload: SignalPayload::new(serde_json::json!({"kind": "offer"})),
            },
        },
    );

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(a.mesh.session_count().await, 0);
    // Logged and dropped, never surfaced as an error.
    assert!(a.log.error_messages().is_empty());

    // An unsolicited acknowledgment is equally harmless.
    relay.inject(
        "peer-a",
        ChannelEvent::Message {
            from: "peer-ghost".to_string(),
            message: PeerMessage::ReadyAck,
        },
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(a.mesh.session_count().await, 0);
}

/// Three-peer mesh over the in-process relay: channel loss leaves zero
/// sessions and fires exactly one close per prior session.
#[tokio::test]
async fn test_channel_closed_tears_down_three_peer_mesh() {
    init_logging();
    let relay = LocalRelay::new();

    let (a_handle, a_events) = relay.join("peer-a").await;
    let a = start_mesh("peer-a", a_handle, a_events, default_media()).await;
    let (b_handle, b_events) = relay.join("peer-b").await;
    let b = start_mesh("peer-b", b_handle, b_events, default_media()).await;
    let (c_handle, c_events) = relay.join("peer-c").await;
    let c = start_mesh("peer-c", c_handle, c_events, default_media()).await;

    for (name, mesh) in [("a", &a), ("b", &b), ("c", &c)] {
        wait_until(&format!("{} fully meshed", name), || async {
            mesh.mesh.session_count().await == 2 && mesh.log.stream_count() == 2
        })
        .await;
    }

    for peer in a.mesh.list_peers().await {
        assert_eq!(peer.state, SessionState::Connected);
    }

    relay.close().await;

    for (name, mesh) in [("a", &a), ("b", &b), ("c", &c)] {
        wait_until(&format!("{} empty", name), || async {
            mesh.mesh.session_count().await == 0
        })
        .await;

        let mut removed = mesh.log.removed_peers();
        removed.sort();
        removed.dedup();
        assert_eq!(removed.len(), 2, "{}: one removal per prior session", name);

        let errors = mesh.log.error_messages();
        assert_eq!(errors.len(), 1, "{}: channel loss surfaced once", name);

        // Exactly one close reached each transport.
        for transport in mesh.factory.created.lock().unwrap().iter() {
            let closes = transport
                .calls()
                .iter()
                .filter(|c| c.as_str() == "close")
                .count();
            assert_eq!(closes, 1, "{}: transport closed exactly once", name);
        }
    }
}

/// A fatal negotiation failure on one peer never cascades to siblings.
#[tokio::test]
async fn test_peer_failure_is_isolated() {
    init_logging();
    let relay = LocalRelay::new();

    let (a_handle, a_events) = relay.join("peer-a").await;
    let a = start_mesh("peer-a", a_handle, a_events, default_media()).await;
    let (b_handle, b_events) = relay.join("peer-b").await;
    let _b = start_mesh("peer-b", b_handle.clone(), b_events, default_media()).await;
    let (c_handle, c_events) = relay.join("peer-c").await;
    let c = start_mesh("peer-c", c_handle, c_events, default_media()).await;

    wait_until("a fully meshed", || async {
        a.mesh.session_count().await == 2 && a.log.stream_count() == 2
    })
    .await;

    // B feeds A a payload its transport rejects fatally.
    b_handle
        .send(
            "peer-a",
            PeerMessage::Signal {
                payload: SignalPayload::new(serde_json::json!({"kind": "poison"})),
            },
        )
        .await
        .unwrap();

    wait_until("b torn down at a", || async {
        a.mesh.session_count().await == 1
    })
    .await;

    assert_eq!(a.log.removed_peers(), vec!["peer-b".to_string()]);
    let errors = a.log.error_messages();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Peer connection failed"));

    // The session with C is untouched, on both ends.
    assert_eq!(a.role_of("peer-c").await.is_some(), true);
    assert_eq!(
        a.mesh.list_peers().await[0].state,
        SessionState::Connected
    );
    assert_eq!(c.mesh.session_count().await, 2);
}

#[tokio::test]
async fn test_stop_closes_sessions_and_is_idempotent() {
    init_logging();
    let relay = LocalRelay::new();

    let (a_handle, a_events) = relay.join("peer-a").await;
    let a = start_mesh("peer-a", a_handle, a_events, default_media()).await;
    let (b_handle, b_events) = relay.join("peer-b").await;
    let _b = start_mesh("peer-b", b_handle, b_events, default_media()).await;

    wait_until("a connected", || async {
        a.mesh.session_count().await == 1 && a.log.stream_count() == 1
    })
    .await;

    a.mesh.stop().await;
    assert_eq!(a.mesh.session_count().await, 0);
    assert_eq!(a.log.removed_peers().len(), 1);

    // A second stop changes nothing and fires nothing.
    a.mesh.stop().await;
    assert_eq!(a.log.removed_peers().len(), 1);
    assert!(a.log.error_messages().is_empty());
}
