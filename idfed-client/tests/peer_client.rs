use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use idfed_client::{PeerClient, PeerRegistry, PeerResponse, PeerSettings, TransportErrorKind};
use url::Url;

async fn spawn_peer() -> Url {
    let app = Router::new()
        .route("/weatherforecast", get(|| async { "OK" }))
        .route(
            "/broken",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

/// An address nothing listens on: bind an ephemeral port, then release it.
async fn unreachable_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

fn client(base: Url, timeout: Duration, retries: u32) -> PeerClient {
    PeerClient::new(
        "Microservice1",
        PeerSettings {
            registry: PeerRegistry::new()
                .with_peer("microservice2", base)
                .with_display_name("microservice2", "Microservice2"),
            timeout,
            retries,
            backoff: Duration::from_millis(10),
        },
    )
}

#[tokio::test]
async fn healthy_peer_body_is_returned() {
    let peers = client(spawn_peer().await, Duration::from_secs(2), 0);
    let resp = peers.call_peer("microservice2", "weatherforecast").await;
    assert_eq!(resp, PeerResponse::Ok("OK".into()));
}

#[tokio::test]
async fn unreachable_peer_degrades() {
    let peers = client(unreachable_url().await, Duration::from_secs(2), 0);
    let resp = peers.call_peer("microservice2", "weatherforecast").await;
    let PeerResponse::Degraded(err) = resp else {
        panic!("expected degraded response");
    };
    assert!(matches!(err.kind, TransportErrorKind::Transport(_)));
    assert!(err
        .to_string()
        .starts_with("Microservice1 failed to call Microservice2: "));
}

#[tokio::test]
async fn retries_are_bounded_and_still_degrade() {
    let peers = client(unreachable_url().await, Duration::from_secs(2), 2);
    let resp = peers.call_peer("microservice2", "weatherforecast").await;
    assert!(!resp.is_ok());
}

#[tokio::test]
async fn unknown_peer_degrades() {
    let peers = client(spawn_peer().await, Duration::from_secs(2), 0);
    let text = peers.call_peer("billing", "invoices").await.into_text();
    assert_eq!(
        text,
        "Microservice1 failed to call billing: no address configured for this peer"
    );
}

#[tokio::test]
async fn error_status_degrades_without_retry() {
    let peers = client(spawn_peer().await, Duration::from_secs(2), 3);
    let resp = peers.call_peer("microservice2", "broken").await;
    let PeerResponse::Degraded(err) = resp else {
        panic!("expected degraded response");
    };
    assert_eq!(err.kind, TransportErrorKind::Status(503));
}

#[tokio::test]
async fn slow_peer_times_out() {
    let peers = client(spawn_peer().await, Duration::from_millis(100), 0);
    let resp = peers.call_peer("microservice2", "/slow").await;
    let PeerResponse::Degraded(err) = resp else {
        panic!("expected degraded response");
    };
    assert_eq!(err.kind, TransportErrorKind::Timeout(Duration::from_millis(100)));
    assert_eq!(
        err.to_string(),
        "Microservice1 failed to call Microservice2: request timed out after 100ms"
    );
}

#[tokio::test]
async fn https_peer_starts_a_tls_handshake() {
    use tokio::io::AsyncReadExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let first_byte = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1];
        socket.read_exact(&mut buf).await.unwrap();
        buf[0]
    });

    let base = Url::parse(&format!("https://{addr}")).unwrap();
    let peers = client(base, Duration::from_secs(2), 0);
    let resp = peers.call_peer("microservice2", "weatherforecast").await;
    assert!(!resp.is_ok());

    // 0x16 opens a TLS handshake record (ClientHello).
    assert_eq!(first_byte.await.unwrap(), 0x16);
}
