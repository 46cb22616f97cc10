use std::time::Duration;

use idfed_client::{PeerClient, PeerRegistry, PeerSettings};
use idfed_core::prelude::*;
use idfed_microservices::caller::{self, CallerTarget};
use idfed_microservices::forecast;
use idfed_test::TestApp;
use url::Url;

async fn spawn_forecast_service() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, forecast::routes()).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

fn caller_app(peer_url: Url) -> TestApp {
    let settings = PeerSettings {
        registry: PeerRegistry::new()
            .with_peer("microservice2", peer_url)
            .with_display_name("microservice2", "Microservice2"),
        timeout: Duration::from_secs(2),
        ..PeerSettings::default()
    };
    let peers = PeerClient::new("Microservice1", settings);
    TestApp::from_builder(
        AppBuilder::new()
            .with(Health)
            .register_routes(caller::routes(peers, CallerTarget::default())),
    )
}

#[tokio::test]
async fn forecast_returns_five_days() {
    let app = TestApp::from_builder(AppBuilder::new().register_routes(forecast::routes()));
    let resp = app.get("/weatherforecast").send().await.assert_ok();
    let resp = resp.assert_json_path("len()", 5);
    let summary: String = resp.json_path("[0].summary");
    assert!(!summary.is_empty());
    let date: String = resp.json_path("[0].date");
    assert_eq!(date.len(), 10);
}

#[tokio::test]
async fn caller_reports_peer_result() {
    let app = caller_app(spawn_forecast_service().await);
    let text = app.get("/test").send().await.assert_ok().text();
    assert!(
        text.starts_with("Result from Microservice1 calling Microservice2: ["),
        "unexpected body: {text}"
    );
    assert!(text.contains("temperatureC"));
}

#[tokio::test]
async fn caller_degrades_when_peer_is_down() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let app = caller_app(Url::parse(&format!("http://{addr}")).unwrap());
    let text = app.get("/test").send().await.assert_ok().text();
    assert!(
        text.starts_with("Microservice1 failed to call Microservice2: "),
        "unexpected body: {text}"
    );
}

#[tokio::test]
async fn caller_target_from_config() {
    let config = IdfedConfig::from_yaml_str(
        "caller:\n  name: Microservice1\n  resource: forecast/today\n",
        "test",
    )
    .unwrap();
    let target = CallerTarget::from_config(&config).unwrap();
    assert_eq!(target.peer, "microservice2");
    assert_eq!(target.resource, "forecast/today");
}

#[tokio::test]
async fn health_is_mounted() {
    let app = caller_app(Url::parse("http://127.0.0.1:9").unwrap());
    let text = app.get("/health").send().await.assert_ok().text();
    assert_eq!(text, "OK");
}
