use axum::http::StatusCode;
use base64::Engine;
use idfed_core::{AppBuilder, IdfedConfig, PathBase};
use idfed_oidc::{ClaimMapping, ClaimType, ConfigurationError, FederationConfig, IdentityServer};
use idfed_test::TestApp;
use serde_json::Value;

fn aad() -> FederationConfig {
    FederationConfig::new(
        "aad",
        "https://login.microsoftonline.com/tenant/v2.0",
        "client-123",
    )
    .display_name("Azure AD")
    .claim_mapping(ClaimMapping::default().map(ClaimType::Role, "roles"))
}

fn build_app() -> TestApp {
    let identity = IdentityServer::new()
        .with_external_scheme(aad())
        .unwrap()
        .build()
        .unwrap();
    TestApp::from_builder(
        AppBuilder::new()
            .path_base(PathBase::parse("/idservice").unwrap())
            .with(identity),
    )
}

fn query(location: &str) -> Vec<(String, String)> {
    url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

fn param<'a>(pairs: &'a [(String, String)], name: &str) -> &'a str {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .unwrap_or_else(|| panic!("missing query parameter {name}"))
}

#[tokio::test]
async fn challenge_redirects_to_upstream() {
    let app = build_app();
    let resp = app
        .get("/idservice/external/challenge/aad?returnUrl=%2Fgrants")
        .header("host", "identity")
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "gateway.example.com")
        .send()
        .await
        .assert_status(StatusCode::FOUND);

    let location = resp.header("location").unwrap().to_string();
    assert!(location.starts_with("https://login.microsoftonline.com/tenant/v2.0/authorize?"));

    let pairs = query(&location);
    assert_eq!(param(&pairs, "client_id"), "client-123");
    assert_eq!(param(&pairs, "response_type"), "id_token");
    assert_eq!(param(&pairs, "response_mode"), "form_post");
    assert_eq!(param(&pairs, "scope"), "openid profile");
    assert_eq!(
        param(&pairs, "redirect_uri"),
        "https://gateway.example.com/idservice/signin-oidc"
    );
    assert!(!param(&pairs, "nonce").is_empty());

    let state = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(param(&pairs, "state"))
        .unwrap();
    let state: Value = serde_json::from_slice(&state).unwrap();
    assert_eq!(state["returnUrl"], "/grants");
}

#[tokio::test]
async fn challenges_use_fresh_nonces() {
    let app = build_app();
    let first = app.get("/external/challenge/aad").send().await;
    let second = app.get("/external/challenge/aad").send().await;
    let first = query(first.header("location").unwrap());
    let second = query(second.header("location").unwrap());
    assert_ne!(param(&first, "nonce"), param(&second, "nonce"));
}

#[tokio::test]
async fn unknown_scheme_is_not_found() {
    build_app()
        .get("/external/challenge/google")
        .send()
        .await
        .assert_not_found()
        .assert_json_path("error", "not_found");
}

#[test]
fn malformed_federation_config_is_fatal() {
    let yaml = r#"
server:
  path_base: /idservice
federation:
  scheme: aad
  authority: not-a-url
  client_id: client-123
"#;
    let config = IdfedConfig::from_yaml_str(yaml, "test").unwrap();
    assert!(matches!(
        IdentityServer::from_config(&config),
        Err(ConfigurationError::Federation(_))
    ));
}

#[test]
fn missing_path_base_is_fatal() {
    let config = IdfedConfig::from_yaml_str("oidc:\n  audience: api\n", "test").unwrap();
    assert!(matches!(
        IdentityServer::from_config(&config),
        Err(ConfigurationError::Config(_))
    ));
}

#[test]
fn full_config_wires_users_and_scheme() {
    let yaml = r#"
server:
  path_base: /idservice
users:
  - subject: "1"
    username: alice
    password: alice
    name: Alice
federation:
  scheme: aad
  authority: https://login.microsoftonline.com/tenant/v2.0
  client_id: client-123
  claim_mapping:
    role: roles
"#;
    let config = IdfedConfig::from_yaml_str(yaml, "test").unwrap();
    let identity = IdentityServer::from_config(&config).unwrap();
    assert_eq!(identity.settings().path_base.as_str(), "/idservice");
}
