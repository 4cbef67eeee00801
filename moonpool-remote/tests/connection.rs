//! Handshake and liveness monitor against a scripted peer.

mod common;

use std::time::Duration;

use common::{Harness, config, next_peer, published, run_local, settle, wait_for_event};
use moonpool_remote::{
    ConnectError, Connection, ConnectionType, LifecycleEvent, RemoteMessage, ServerConnection,
};

#[test]
fn test_handshake_identifies_local_node_and_publishes_connected() {
    run_local(async {
        let Harness {
            providers,
            transport,
            events,
            mut accepted,
            ..
        } = Harness::new();
        let mut rx = events.subscribe();
        let config = config();

        let (connection, request) = tokio::join!(
            Connection::connect(&providers, &transport, "node-b:4020", &config, &events),
            async {
                let mut peer = next_peer(&mut accepted).await;
                let request = peer.accept_handshake().await;
                (request, peer)
            }
        );
        let connection = connection.expect("handshake accepted");
        let (request, _peer) = request;

        assert_eq!(connection.address(), "node-b:4020");
        assert_eq!(
            request.connection_type,
            ConnectionType::ServerConnection(ServerConnection {
                system_id: "system-a".to_string(),
                address: "node-a:4020".to_string(),
            })
        );
        assert_eq!(
            published(&mut rx),
            vec![LifecycleEvent::Connected {
                address: "node-b:4020".to_string()
            }]
        );
    });
}

#[test]
fn test_wrong_handshake_variant_is_protocol_error() {
    run_local(async {
        let Harness {
            providers,
            transport,
            events,
            mut accepted,
            ..
        } = Harness::new();
        let mut rx = events.subscribe();
        let config = config();

        let (result, mut peer) = tokio::join!(
            Connection::connect(&providers, &transport, "node-b:4020", &config, &events),
            async {
                let mut peer = next_peer(&mut accepted).await;
                assert!(matches!(
                    peer.recv().await,
                    Some(RemoteMessage::ConnectRequest(_))
                ));
                peer.send(&RemoteMessage::DisconnectRequest).await;
                peer
            }
        );

        match result {
            Err(ConnectError::HandshakeProtocol { address, received }) => {
                assert_eq!(address, "node-b:4020");
                assert_eq!(received, "DisconnectRequest");
            }
            other => panic!("expected protocol error, got {:?}", other.err()),
        }
        assert!(published(&mut rx).is_empty());
        // The failed connection was torn down.
        assert!(peer.drain().await.is_empty());
    });
}

#[test]
fn test_refused_dial_is_dial_error() {
    run_local(async {
        let harness = Harness::new();
        harness.network.refuse("node-b:4020");
        let mut rx = harness.events.subscribe();

        let result = Connection::connect(
            &harness.providers,
            &harness.transport,
            "node-b:4020",
            &config(),
            &harness.events,
        )
        .await;

        assert!(matches!(result, Err(ConnectError::Dial { .. })));
        assert!(published(&mut rx).is_empty());
    });
}

#[test]
fn test_silent_peer_hits_handshake_timeout() {
    run_local(async {
        let Harness {
            providers,
            transport,
            events,
            mut accepted,
            ..
        } = Harness::new();
        let config = config().with_handshake_timeout(Duration::from_millis(50));

        let (result, _peer) = tokio::join!(
            Connection::connect(&providers, &transport, "node-b:4020", &config, &events),
            async {
                let mut peer = next_peer(&mut accepted).await;
                let _ = peer.recv().await;
                peer
            }
        );

        assert!(matches!(
            result,
            Err(ConnectError::HandshakeTimeout { .. })
        ));
    });
}

#[test]
fn test_peer_disconnect_publishes_single_terminated() {
    run_local(async {
        let Harness {
            providers,
            transport,
            events,
            mut accepted,
            ..
        } = Harness::new();
        let mut rx = events.subscribe();
        let config = config();

        let (connection, mut peer) = tokio::join!(
            Connection::connect(&providers, &transport, "node-b:4020", &config, &events),
            async {
                let mut peer = next_peer(&mut accepted).await;
                peer.accept_handshake().await;
                peer
            }
        );
        let mut connection = connection.expect("connected");
        connection.spawn_monitor(&providers, &events);
        wait_for_event(&mut rx, |e| matches!(e, LifecycleEvent::Connected { .. })).await;

        peer.send(&RemoteMessage::DisconnectRequest).await;
        peer.send(&RemoteMessage::DisconnectRequest).await;
        peer.close_send().await;

        let event = wait_for_event(&mut rx, |_| true).await;
        assert!(event.is_terminated_for("node-b:4020"));
        settle().await;
        assert!(published(&mut rx).is_empty());
    });
}

#[test]
fn test_clean_end_of_stream_publishes_nothing() {
    run_local(async {
        let Harness {
            providers,
            transport,
            events,
            mut accepted,
            ..
        } = Harness::new();
        let config = config();

        let (connection, mut peer) = tokio::join!(
            Connection::connect(&providers, &transport, "node-b:4020", &config, &events),
            async {
                let mut peer = next_peer(&mut accepted).await;
                peer.accept_handshake().await;
                peer
            }
        );
        let mut connection = connection.expect("connected");
        let mut rx = events.subscribe();
        connection.spawn_monitor(&providers, &events);

        peer.close_send().await;
        settle().await;
        assert!(published(&mut rx).is_empty());
    });
}

#[test]
fn test_close_ends_stream_and_stops_monitor_quietly() {
    run_local(async {
        let Harness {
            providers,
            transport,
            events,
            mut accepted,
            ..
        } = Harness::new();
        let config = config();

        let (connection, mut peer) = tokio::join!(
            Connection::connect(&providers, &transport, "node-b:4020", &config, &events),
            async {
                let mut peer = next_peer(&mut accepted).await;
                peer.accept_handshake().await;
                peer
            }
        );
        let mut connection = connection.expect("connected");
        let mut rx = events.subscribe();
        connection.spawn_monitor(&providers, &events);
        assert!(!connection.has_unmonitored_receiver());

        connection.close().await;
        assert!(peer.drain().await.is_empty());
        settle().await;
        assert!(published(&mut rx).is_empty());

        let send_after_close = connection
            .send_batch(moonpool_remote::MessageBatch::default())
            .await;
        assert!(send_after_close.is_err());
    });
}
