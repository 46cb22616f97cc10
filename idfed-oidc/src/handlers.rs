use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Form, Json};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use idfed_core::RequestOrigin;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::claims::{claims_to_json, ClaimType};
use crate::error::OidcError;
use crate::state::OidcState;
use crate::subject::{Subject, LOCAL_IDENTITY_PROVIDER};

/// RFC 6749 §5.1 required headers for token responses.
type TokenResponseHeaders = [(header::HeaderName, &'static str); 2];
const TOKEN_HEADERS: TokenResponseHeaders = [
    (header::CACHE_CONTROL, "no-store"),
    (header::PRAGMA, "no-cache"),
];

const DEFAULT_SCOPE: &str = "openid profile";
const ANONYMOUS_CLIENT: &str = "anonymous";

/// Token request parameters (form-urlencoded).
#[derive(Debug, Deserialize)]
pub(crate) struct TokenRequest {
    pub grant_type: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub scope: Option<String>,
}

/// Token response.
#[derive(Serialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub scope: String,
}

/// POST /connect/token
pub(crate) async fn token_handler(
    State(state): State<Arc<OidcState>>,
    origin: RequestOrigin,
    Form(req): Form<TokenRequest>,
) -> Result<impl IntoResponse, OidcError> {
    let json = match req.grant_type.as_str() {
        "password" => handle_password_grant(&state, &origin, req).await?,
        other => {
            return Err(OidcError::UnsupportedGrantType(format!(
                "grant_type '{other}' is not supported"
            )))
        }
    };
    Ok((TOKEN_HEADERS, json))
}

async fn handle_password_grant(
    state: &OidcState,
    origin: &RequestOrigin,
    req: TokenRequest,
) -> Result<Json<TokenResponse>, OidcError> {
    let username = req
        .username
        .ok_or_else(|| OidcError::InvalidRequest("missing 'username' parameter".into()))?;
    let password = req
        .password
        .ok_or_else(|| OidcError::InvalidRequest("missing 'password' parameter".into()))?;
    let client_id = req.client_id.as_deref().unwrap_or(ANONYMOUS_CLIENT);

    debug!(%username, client_id, "Processing password grant");

    if !state.user_store.verify_password(&username, &password).await {
        warn!(%username, "Invalid credentials");
        return Err(OidcError::InvalidGrant("invalid username or password".into()));
    }

    let user = state
        .user_store
        .find_by_username(&username)
        .await
        .ok_or_else(|| OidcError::InvalidGrant("user not found".into()))?;

    let issued = state.claims_issuer.issue(user.to_subject(), client_id).await?;
    let issuer = state.issuer_for(origin);
    let token = state.token_service.issue(&issuer, &issued, client_id, "pwd")?;

    info!(sub = %issued.subject.id, client_id, claims = issued.claims.len(), "Access token issued");
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in: state.token_service.token_ttl_secs(),
        scope: req.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
    }))
}

/// OpenID Connect discovery document.
#[derive(Serialize)]
pub(crate) struct DiscoveryDocument {
    issuer: String,
    jwks_uri: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_challenge_endpoint: Option<String>,
    scopes_supported: Vec<&'static str>,
    claims_supported: Vec<String>,
    grant_types_supported: Vec<&'static str>,
    response_types_supported: Vec<&'static str>,
    subject_types_supported: Vec<&'static str>,
    id_token_signing_alg_values_supported: Vec<&'static str>,
}

/// GET /.well-known/openid-configuration
///
/// Every URL is built from the request origin, so it carries the path base
/// and any forwarded scheme and host.
pub(crate) async fn discovery_handler(
    State(state): State<Arc<OidcState>>,
    origin: RequestOrigin,
) -> Json<DiscoveryDocument> {
    Json(DiscoveryDocument {
        issuer: state.issuer_for(&origin),
        jwks_uri: origin.absolute_url("/.well-known/openid-configuration/jwks"),
        token_endpoint: origin.absolute_url("/connect/token"),
        userinfo_endpoint: origin.absolute_url("/connect/userinfo"),
        external_challenge_endpoint: (!state.schemes.is_empty())
            .then(|| origin.absolute_url("/external/challenge")),
        scopes_supported: vec!["openid", "profile", "roles"],
        claims_supported: ClaimType::recognized()
            .iter()
            .map(|t| t.as_str().to_string())
            .collect(),
        grant_types_supported: vec!["password"],
        response_types_supported: vec!["token"],
        subject_types_supported: vec!["public"],
        id_token_signing_alg_values_supported: vec!["RS256"],
    })
}

/// GET /.well-known/openid-configuration/jwks
pub(crate) async fn jwks_handler(
    State(state): State<Arc<OidcState>>,
) -> Result<Json<Value>, OidcError> {
    state.jwks_json_value().map(Json)
}

/// GET|POST /connect/userinfo
///
/// Re-runs the profile service, so a subject deactivated after issuance
/// stops receiving claims.
pub(crate) async fn userinfo_handler(
    State(state): State<Arc<OidcState>>,
    origin: RequestOrigin,
    headers: HeaderMap,
) -> Result<Json<Value>, OidcError> {
    let token = extract_bearer_token(&headers)?;
    let payload = state
        .token_service
        .validate(token, &state.issuer_for(&origin))?;

    let sub = payload
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| OidcError::Unauthorized("token missing 'sub' claim".into()))?;
    let caller = payload
        .get("client_id")
        .and_then(Value::as_str)
        .unwrap_or(ANONYMOUS_CLIENT);

    let subject = match state.user_store.find_by_subject(sub).await {
        Some(user) => user.to_subject(),
        None => subject_from_token(sub, &payload),
    };

    let issued = state
        .claims_issuer
        .issue(subject, caller)
        .await
        .map_err(|e| match e {
            OidcError::InactiveSubject(_) => {
                OidcError::Unauthorized("subject is not active".into())
            }
            other => other,
        })?;

    let mut body = Map::new();
    body.insert("sub".into(), Value::String(issued.subject.id.clone()));
    body.extend(claims_to_json(&issued.claims, &["sub"]));
    Ok(Json(Value::Object(body)))
}

/// Rebuild a subject that is not in the local store (external login) from
/// the token's own claims.
fn subject_from_token(sub: &str, payload: &Value) -> Subject {
    let mut subject = Subject::new(sub);
    if let Some(name) = payload.get("name").and_then(Value::as_str) {
        subject.display_name = Some(name.to_string());
    }
    if let Some(idp) = payload
        .get("idp")
        .and_then(Value::as_str)
        .filter(|idp| *idp != LOCAL_IDENTITY_PROVIDER)
    {
        subject.add_attribute("idp", idp);
    }
    subject
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, OidcError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OidcError::Unauthorized("missing Authorization header".into()))?;

    auth.strip_prefix("Bearer ")
        .ok_or_else(|| OidcError::Unauthorized("expected Bearer token".into()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChallengeQuery {
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

/// GET /external/challenge/{scheme}
///
/// Redirects to the upstream authorization endpoint. `state` carries the
/// return URL; the nonce is random.
pub(crate) async fn challenge_handler(
    State(state): State<Arc<OidcState>>,
    origin: RequestOrigin,
    Path(scheme): Path<String>,
    Query(query): Query<ChallengeQuery>,
) -> Result<impl IntoResponse, OidcError> {
    let federation = state
        .schemes
        .get(&scheme)
        .ok_or_else(|| OidcError::NotFound(format!("unknown external scheme '{scheme}'")))?;

    let return_url = query.return_url.unwrap_or_else(|| "/".to_string());
    let challenge_state = URL_SAFE_NO_PAD.encode(
        json!({ "returnUrl": return_url, "id": random_token() }).to_string(),
    );
    let nonce = random_token();

    let url = federation
        .challenge_url(&origin, &challenge_state, &nonce)
        .map_err(|e| OidcError::Internal(e.to_string()))?;

    info!(%scheme, redirect_uri = %federation.redirect_uri(&origin), "External login challenge");
    Ok((StatusCode::FOUND, [(header::LOCATION, url.to_string())]))
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
