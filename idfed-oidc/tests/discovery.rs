use idfed_core::{AppBuilder, PathBase};
use idfed_oidc::{FederationConfig, IdentityServer};
use idfed_test::TestApp;

fn build_app(path_base: &str) -> TestApp {
    let identity = IdentityServer::new().build().unwrap();
    TestApp::from_builder(
        AppBuilder::new()
            .path_base(PathBase::parse(path_base).unwrap())
            .with(identity),
    )
}

#[tokio::test]
async fn discovery_urls_carry_path_base() {
    let app = build_app("/idservice");
    let resp = app
        .get("/.well-known/openid-configuration")
        .header("host", "identity:5000")
        .send()
        .await
        .assert_ok();

    resp.assert_json_path("issuer", "http://identity:5000/idservice")
        .assert_json_path("token_endpoint", "http://identity:5000/idservice/connect/token")
        .assert_json_path(
            "jwks_uri",
            "http://identity:5000/idservice/.well-known/openid-configuration/jwks",
        )
        .assert_json_path(
            "userinfo_endpoint",
            "http://identity:5000/idservice/connect/userinfo",
        )
        .assert_json_path("grant_types_supported[0]", "password")
        .assert_json_path("claims_supported.len()", 6);
}

#[tokio::test]
async fn prefixed_request_yields_same_document() {
    let app = build_app("/idservice");
    let stripped: serde_json::Value = app
        .get("/.well-known/openid-configuration")
        .send()
        .await
        .assert_ok()
        .json();
    let prefixed: serde_json::Value = app
        .get("/idservice/.well-known/openid-configuration")
        .send()
        .await
        .assert_ok()
        .json();
    assert_eq!(stripped, prefixed);
}

#[tokio::test]
async fn prefix_match_is_case_insensitive() {
    let app = build_app("/idservice");
    app.get("/IdService/.well-known/openid-configuration")
        .send()
        .await
        .assert_ok()
        .assert_json_path("issuer", "http://localhost/idservice");
}

#[tokio::test]
async fn forwarded_headers_shape_discovery() {
    let app = build_app("/idservice");
    app.get("/.well-known/openid-configuration")
        .header("host", "identity")
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "edge.example.com, gateway.example.com")
        .send()
        .await
        .assert_ok()
        .assert_json_path("issuer", "https://gateway.example.com/idservice")
        .assert_json_path(
            "token_endpoint",
            "https://gateway.example.com/idservice/connect/token",
        );
}

#[tokio::test]
async fn root_path_base_has_no_prefix() {
    let app = build_app("/");
    app.get("/.well-known/openid-configuration")
        .send()
        .await
        .assert_ok()
        .assert_json_path("issuer", "http://localhost")
        .assert_json_path("token_endpoint", "http://localhost/connect/token");
}

#[tokio::test]
async fn configured_issuer_wins_over_origin() {
    let identity = IdentityServer::new()
        .issuer("https://id.example.com")
        .build()
        .unwrap();
    let app = TestApp::from_builder(
        AppBuilder::new()
            .path_base(PathBase::parse("/idservice").unwrap())
            .with(identity),
    );
    app.get("/.well-known/openid-configuration")
        .send()
        .await
        .assert_ok()
        .assert_json_path("issuer", "https://id.example.com")
        .assert_json_path("token_endpoint", "http://localhost/idservice/connect/token");
}

#[tokio::test]
async fn challenge_endpoint_is_advertised_with_a_scheme() {
    let identity = IdentityServer::new()
        .with_external_scheme(FederationConfig::new(
            "aad",
            "https://login.example.com/tenant",
            "client-123",
        ))
        .unwrap()
        .build()
        .unwrap();
    let app = TestApp::from_builder(AppBuilder::new().with(identity));
    app.get("/.well-known/openid-configuration")
        .send()
        .await
        .assert_ok()
        .assert_json_path(
            "external_challenge_endpoint",
            "http://localhost/external/challenge",
        );
}

#[tokio::test]
async fn jwks_lists_signing_key() {
    let app = build_app("/idservice");
    app.get("/idservice/.well-known/openid-configuration/jwks")
        .send()
        .await
        .assert_ok()
        .assert_json_path("keys.len()", 1)
        .assert_json_path("keys[0].kty", "RSA")
        .assert_json_path("keys[0].alg", "RS256")
        .assert_json_path("keys[0].kid", "idfed-signing-key-1");
}

#[tokio::test]
async fn unrelated_prefix_is_not_stripped() {
    let app = build_app("/idservice");
    app.get("/idservicex/.well-known/openid-configuration")
        .send()
        .await
        .assert_not_found();
}
