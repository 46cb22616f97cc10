use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use http_body_util::BodyExt;
use idfed_core::{AppBuilder, Health, PathBase, RequestOrigin};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn whoami(origin: RequestOrigin, uri: axum::http::Uri) -> Json<Value> {
    Json(json!({
        "path": uri.path(),
        "base_url": origin.base_url(),
        "self": origin.absolute_url(uri.path()),
    }))
}

fn build(path_base: &str, forwarded: bool) -> idfed_core::App {
    AppBuilder::new()
        .path_base(PathBase::parse(path_base).unwrap())
        .forwarded_headers(forwarded)
        .with(Health)
        .register_routes(Router::new().route("/whoami", get(whoami)))
        .build()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn stripped_request_is_rebased_under_path_base() {
    let app = build("/idservice", true);
    let req = Request::get("/whoami")
        .header("host", "identity:80")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["path"], "/whoami");
    assert_eq!(json["self"], "http://identity:80/idservice/whoami");
}

#[tokio::test]
async fn prefixed_request_is_routed_after_stripping() {
    let app = build("/idservice", true);
    let req = Request::get("/idservice/whoami")
        .header("host", "identity")
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "gateway.example.com")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["path"], "/whoami");
    assert_eq!(json["base_url"], "https://gateway.example.com/idservice");
}

#[tokio::test]
async fn forwarded_headers_can_be_disabled() {
    let app = build("/idservice", false);
    let req = Request::get("/whoami")
        .header("host", "identity")
        .header("x-forwarded-host", "gateway.example.com")
        .body(Body::empty())
        .unwrap();

    let json = body_json(app.oneshot(req).await.unwrap()).await;
    assert_eq!(json["base_url"], "http://identity/idservice");
}

#[tokio::test]
async fn plugin_routes_sit_behind_the_boundary() {
    let app = build("/idservice", true);

    let direct = Request::get("/health").body(Body::empty()).unwrap();
    assert_eq!(app.clone().oneshot(direct).await.unwrap().status(), StatusCode::OK);

    let prefixed = Request::get("/idservice/health").body(Body::empty()).unwrap();
    assert_eq!(app.oneshot(prefixed).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn root_path_base_changes_nothing() {
    let app = build("/", true);
    let req = Request::get("/whoami")
        .header("host", "identity")
        .body(Body::empty())
        .unwrap();

    let json = body_json(app.oneshot(req).await.unwrap()).await;
    assert_eq!(json["self"], "http://identity/whoami");
}
