//! Integration tests for the WebSocket relay.
//!
//! These spin up a real relay on a random port and attach peers to it
//! over TCP.

#[cfg(feature = "websocket")]
mod relay {
    use std::time::Duration;

    use meshroom_transport::{
        Channel, ChannelEvent, Mesh, PeerId, RelayMesh, RelayServer,
    };
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn pid(s: &str) -> PeerId {
        PeerId::new(s)
    }

    /// Starts a relay on an OS-assigned port and returns its URL.
    async fn start_relay() -> String {
        let server = RelayServer::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = server.local_addr().expect("should have an address");
        tokio::spawn(server.run());
        format!("ws://{addr}")
    }

    async fn next_event(
        rx: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> ChannelEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event should arrive in time")
            .expect("sink should stay open")
    }

    #[tokio::test]
    async fn test_relay_fans_out_to_other_subscribers() {
        let url = start_relay().await;
        let alice = RelayMesh::new(&url, pid("alice"));
        let bob = RelayMesh::new(&url, pid("bob"));

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, _b_rx) = mpsc::unbounded_channel();
        let _a_lobby = alice.open("lobby", a_tx).await.unwrap();
        let b_lobby = bob.open("lobby", b_tx).await.unwrap();

        assert_eq!(
            next_event(&mut a_rx).await,
            ChannelEvent::PeerJoined {
                topic: "lobby".into(),
                peer: pid("bob"),
            }
        );

        b_lobby
            .publish("room_announce", b"{}".to_vec(), None)
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut a_rx).await,
            ChannelEvent::Message {
                topic: "lobby".into(),
                action: "room_announce".into(),
                from: pid("bob"),
                payload: b"{}".to_vec(),
            }
        );
    }

    #[tokio::test]
    async fn test_relay_unicast_skips_other_peers() {
        let url = start_relay().await;
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        let alice = RelayMesh::new(&url, pid("alice"))
            .open("room:1", a_tx)
            .await
            .unwrap();
        let _bob = RelayMesh::new(&url, pid("bob"))
            .open("room:1", b_tx)
            .await
            .unwrap();
        let _carol = RelayMesh::new(&url, pid("carol"))
            .open("room:1", c_tx)
            .await
            .unwrap();

        // Wait until alice has seen both others, so everyone is registered.
        for _ in 0..2 {
            assert!(matches!(
                next_event(&mut a_rx).await,
                ChannelEvent::PeerJoined { .. }
            ));
        }

        alice
            .publish("join_response", vec![7], Some(&pid("carol")))
            .await
            .unwrap();
        alice.publish("game_state", vec![8], None).await.unwrap();

        // Carol gets both, bob only the broadcast.
        let mut carol_payloads = Vec::new();
        while carol_payloads.len() < 2 {
            if let ChannelEvent::Message { payload, .. } =
                next_event(&mut c_rx).await
            {
                carol_payloads.push(payload);
            }
        }
        assert_eq!(carol_payloads, vec![vec![7], vec![8]]);

        let mut bob_payloads = Vec::new();
        while bob_payloads.is_empty() {
            if let ChannelEvent::Message { payload, .. } =
                next_event(&mut b_rx).await
            {
                bob_payloads.push(payload);
            }
        }
        assert_eq!(bob_payloads, vec![vec![8]]);
    }

    #[tokio::test]
    async fn test_relay_reports_disconnect_as_peer_left() {
        let url = start_relay().await;
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, _b_rx) = mpsc::unbounded_channel();
        let _alice = RelayMesh::new(&url, pid("alice"))
            .open("room:1", a_tx)
            .await
            .unwrap();
        let bob = RelayMesh::new(&url, pid("bob"))
            .open("room:1", b_tx)
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut a_rx).await,
            ChannelEvent::PeerJoined { .. }
        ));

        bob.close().await.unwrap();

        assert_eq!(
            next_event(&mut a_rx).await,
            ChannelEvent::PeerLeft {
                topic: "room:1".into(),
                peer: pid("bob"),
            }
        );
    }

    #[tokio::test]
    async fn test_relay_bind_reports_address() {
        let server = RelayServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
