use idfed_core::{AppBuilder, PathBase};
use idfed_oidc::{
    ClaimsPolicy, IdentityServer, IdentityServerSettings, InMemoryUserStore,
    InactiveSubjectHandling, IsActiveContext, LocalUser, ProfileDataRequestContext,
    ProfileService, StaticRolePolicy,
};
use idfed_test::TestApp;
use serde_json::{json, Value};

fn users() -> InMemoryUserStore {
    InMemoryUserStore::new()
        .add_user(
            "alice",
            "alice-pass",
            LocalUser::new("1")
                .with_name("Alice")
                .with_email("alice@example.com"),
        )
        .unwrap()
        .add_user("nameless", "nameless-pass", LocalUser::new("2").with_name(""))
        .unwrap()
}

fn build_app(identity: IdentityServer) -> TestApp {
    TestApp::from_builder(
        AppBuilder::new()
            .path_base(PathBase::parse("/idservice").unwrap())
            .with(identity.build().unwrap()),
    )
}

/// Decode the payload of a JWT without verifying it.
fn payload(token: &str) -> Value {
    use base64::Engine;
    let part = token.split('.').nth(1).unwrap();
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(part)
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn alice_receives_roles_and_name() {
    let app = build_app(IdentityServer::new().with_user_store(users()));
    let resp = app
        .post("/idservice/connect/token")
        .form(&[
            ("grant_type", "password"),
            ("username", "alice"),
            ("password", "alice-pass"),
            ("client_id", "weather"),
        ])
        .send()
        .await
        .assert_ok()
        .assert_json_path("token_type", "Bearer")
        .assert_json_path("expires_in", 3600)
        .assert_json_path("scope", "openid profile");
    assert_eq!(resp.header("cache-control"), Some("no-store"));

    let claims = payload(&resp.json_path::<String>("access_token"));
    assert_eq!(claims["sub"], "1");
    assert_eq!(claims["iss"], "http://localhost/idservice");
    assert_eq!(claims["aud"], "api");
    assert_eq!(claims["idp"], "local");
    assert_eq!(claims["client_id"], "weather");
    assert_eq!(claims["role"], json!(["Administrator", "User"]));
    assert_eq!(claims["name"], "Alice");
}

#[tokio::test]
async fn empty_display_name_omits_name_claim() {
    let app = build_app(IdentityServer::new().with_user_store(users()));
    let token = app
        .password_token("/connect/token", "nameless", "nameless-pass")
        .await;
    let claims = payload(&token);
    assert_eq!(claims["role"], json!(["Administrator", "User"]));
    assert!(claims.get("name").is_none());
}

#[tokio::test]
async fn configured_roles_are_issued_in_order() {
    let settings = IdentityServerSettings {
        roles: vec!["Reader".into(), "Reader".into()],
        ..Default::default()
    };
    let identity = IdentityServer::with_settings(settings).with_user_store(users());

    let token = build_app(identity)
        .password_token("/connect/token", "alice", "alice-pass")
        .await;
    assert_eq!(payload(&token)["role"], json!(["Reader", "Reader"]));
}

#[tokio::test]
async fn wrong_password_is_invalid_grant() {
    let app = build_app(IdentityServer::new().with_user_store(users()));
    app.post("/connect/token")
        .form(&[
            ("grant_type", "password"),
            ("username", "alice"),
            ("password", "nope"),
        ])
        .send()
        .await
        .assert_bad_request()
        .assert_json_path("error", "invalid_grant");
}

#[tokio::test]
async fn missing_username_is_invalid_request() {
    let app = build_app(IdentityServer::new().with_user_store(users()));
    app.post("/connect/token")
        .form(&[("grant_type", "password"), ("password", "alice-pass")])
        .send()
        .await
        .assert_bad_request()
        .assert_json_path("error", "invalid_request");
}

#[tokio::test]
async fn client_credentials_is_unsupported() {
    let app = build_app(IdentityServer::new().with_user_store(users()));
    app.post("/connect/token")
        .form(&[("grant_type", "client_credentials"), ("client_id", "svc")])
        .send()
        .await
        .assert_bad_request()
        .assert_json_path("error", "unsupported_grant_type");
}

struct Deactivated;

impl ProfileService for Deactivated {
    async fn get_profile_data(&self, context: &mut ProfileDataRequestContext) {
        let evaluation = StaticRolePolicy::default().evaluate(context.subject());
        context.add_claims(evaluation.claims);
    }

    async fn is_active(&self, _context: &IsActiveContext) -> bool {
        false
    }
}

#[tokio::test]
async fn inactive_subject_is_refused() {
    let app = build_app(
        IdentityServer::new()
            .with_user_store(users())
            .with_profile_service(Deactivated),
    );
    app.post("/connect/token")
        .form(&[
            ("grant_type", "password"),
            ("username", "alice"),
            ("password", "alice-pass"),
        ])
        .send()
        .await
        .assert_bad_request()
        .assert_json_path("error", "invalid_grant")
        .assert_json_path("error_description", "subject '1' is not active");
}

#[tokio::test]
async fn inactive_subject_can_receive_a_bare_token() {
    let app = build_app(
        IdentityServer::new()
            .with_user_store(users())
            .with_profile_service(Deactivated)
            .inactive_subject(InactiveSubjectHandling::StripClaims),
    );
    let token = app
        .password_token("/connect/token", "alice", "alice-pass")
        .await;
    let claims = payload(&token);
    assert_eq!(claims["sub"], "1");
    assert!(claims.get("role").is_none());
    assert!(claims.get("name").is_none());
}
