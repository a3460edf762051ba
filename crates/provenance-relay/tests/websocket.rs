//! Broadcast and subscription against a loopback WebSocket relay.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use provenance_core::{Keypair, UnsignedWireEvent, WireEvent};
use provenance_relay::{
    BroadcastConfig, ClientMessage, Filter, InboundMessage, MemoryConnector, MemoryRelayNetwork,
    RelayBehaviour, RelayBroadcaster, RelayMessage, RelaySubscriber, SubscriberConfig,
    TimeoutPolicy,
};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// A relay that accepts every event, or rejects them all.
async fn spawn_relay(accept: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = accept_async(tcp).await.unwrap();
                while let Some(Ok(frame)) = ws.next().await {
                    let Message::Text(text) = frame else { continue };
                    if let Ok(ClientMessage::Event(event)) = ClientMessage::from_json(text.as_str()) {
                        let reply = RelayMessage::Ok {
                            event_id: event.id,
                            accepted: accept,
                            message: if accept { String::new() } else { "blocked: test".into() },
                        };
                        let json = reply.to_json().unwrap();
                        if ws.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });
    format!("ws://{addr}")
}

fn signed_note(content: &str) -> WireEvent {
    let keypair = Keypair::generate();
    UnsignedWireEvent::new(keypair.public_key(), 1_700_000_000, 1, vec![], content)
        .sign_with(&keypair)
        .unwrap()
}

#[tokio::test]
async fn test_websocket_publish_quorum() {
    let accepting = spawn_relay(true).await;
    let rejecting = spawn_relay(false).await;
    let broadcaster = RelayBroadcaster::websocket(BroadcastConfig {
        connect_timeout: Duration::from_secs(2),
        ack_timeout: Duration::from_secs(2),
        timeout_policy: TimeoutPolicy::CountAsSuccess,
    });

    let event = signed_note("over the wire");
    let result = broadcaster
        .publish(&event, &[accepting.clone(), rejecting.clone()], 1)
        .await;

    assert!(result.published);
    assert_eq!(result.success, vec![accepting]);
    assert_eq!(result.failure.len(), 1);
    assert_eq!(result.failure[0].endpoint, rejecting);
    assert!(result.timed_out.is_empty());
}

#[tokio::test]
async fn test_websocket_unreachable_endpoint() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let broadcaster = RelayBroadcaster::websocket(BroadcastConfig::default());
    let result = broadcaster
        .publish(&signed_note("nobody home"), &[format!("ws://{addr}")], 1)
        .await;
    assert!(!result.published);
    assert_eq!(result.failure.len(), 1);
}

#[tokio::test]
async fn test_memory_publish_then_subscribe() {
    let network = MemoryRelayNetwork::new();
    network.add_relay("ws://one", RelayBehaviour::Accept);
    network.add_relay("ws://two", RelayBehaviour::Accept);
    let connector = Arc::new(MemoryConnector::new(network.clone()));

    let subscriber = RelaySubscriber::new(connector.clone(), SubscriberConfig::default());
    let handle = subscriber
        .subscribe("ws://two", vec![Filter::new().kinds([1])])
        .await
        .unwrap();
    let mut stream = subscriber.listen(handle);
    assert_eq!(stream.next().await, Some(InboundMessage::EndOfStoredEvents));

    let broadcaster = RelayBroadcaster::new(connector, BroadcastConfig::default());
    let event = signed_note("fan out");
    let result = broadcaster
        .publish(&event, &["ws://one".into(), "ws://two".into()], 2)
        .await;
    assert!(result.published);

    assert_eq!(stream.next().await, Some(InboundMessage::Event(event)));
    stream.cancel().await;
}
