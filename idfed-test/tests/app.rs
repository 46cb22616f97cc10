use axum::routing::{get, post};
use axum::{Form, Json, Router};
use idfed_core::{AppBuilder, PathBase, RequestOrigin};
use idfed_test::{resolve_path, TestApp};
use serde_json::{json, Value};

#[test]
fn test_resolve_simple_field() {
    let v = json!({"name": "Alice"});
    assert_eq!(resolve_path(&v, "name"), json!("Alice"));
}

#[test]
fn test_resolve_array_nested() {
    let v = json!({"keys": [{"kid": "k1", "use": "sig"}]});
    assert_eq!(resolve_path(&v, "keys[0].kid"), json!("k1"));
}

#[test]
fn test_resolve_len() {
    let v = json!({"role": ["Administrator", "User"]});
    assert_eq!(resolve_path(&v, "role.len()"), json!(2));
}

#[test]
fn test_resolve_missing_field() {
    let v = json!({"name": "Alice"});
    assert_eq!(resolve_path(&v, "missing"), Value::Null);
    assert_eq!(resolve_path(&v, "name[3]"), Value::Null);
}

fn echo_app() -> TestApp {
    let router = Router::new()
        .route(
            "/origin",
            get(|origin: RequestOrigin| async move { Json(json!({ "base": origin.base_url() })) }),
        )
        .route(
            "/form",
            post(|Form(fields): Form<Vec<(String, String)>>| async move { Json(json!(fields)) }),
        );
    TestApp::from_builder(
        AppBuilder::new()
            .path_base(PathBase::parse("/svc").unwrap())
            .register_routes(router),
    )
}

#[tokio::test]
async fn test_requests_pass_through_the_boundary() {
    let app = echo_app();
    app.get("/svc/origin")
        .send()
        .await
        .assert_ok()
        .assert_json_path("base", "http://localhost/svc");

    app.get("/origin")
        .header("x-forwarded-proto", "https")
        .header("host", "gateway")
        .send()
        .await
        .assert_ok()
        .assert_json_path("base", "https://gateway/svc");
}

#[tokio::test]
async fn test_form_body_is_urlencoded() {
    let app = echo_app();
    app.post("/form")
        .form(&[("grant_type", "password"), ("username", "a b&c")])
        .send()
        .await
        .assert_ok()
        .assert_json_path("[1][1]", "a b&c");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    echo_app().get("/nope").send().await.assert_not_found();
}
