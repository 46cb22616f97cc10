use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::claims::claims_to_json;
use crate::error::OidcError;
use crate::issuance::IssuedClaims;
use crate::keys::SigningCredential;

/// Protocol claims set by the token service; issued claims never override them.
pub const PROTOCOL_CLAIMS: &[&str] = &[
    "sub",
    "iss",
    "aud",
    "iat",
    "nbf",
    "exp",
    "idp",
    "amr",
    "client_id",
];

/// Signs and validates RS256 access tokens.
pub struct TokenService {
    credential: Arc<SigningCredential>,
    audience: String,
    token_ttl_secs: u64,
}

impl TokenService {
    pub fn new(
        credential: Arc<SigningCredential>,
        audience: impl Into<String>,
        token_ttl_secs: u64,
    ) -> Self {
        Self {
            credential,
            audience: audience.into(),
            token_ttl_secs,
        }
    }

    /// Sign a token for an issuance.
    ///
    /// Claim types that occur more than once are emitted as arrays.
    pub fn issue(
        &self,
        issuer: &str,
        issued: &IssuedClaims,
        client_id: &str,
        amr: &str,
    ) -> Result<String, OidcError> {
        let now = now_secs()?;
        let mut payload = json!({
            "sub": issued.subject.id,
            "iss": issuer,
            "aud": self.audience,
            "iat": now,
            "nbf": now,
            "exp": now.saturating_add(self.token_ttl_secs),
            "idp": issued.subject.identity_provider(),
            "amr": [amr],
            "client_id": client_id,
        });
        if let Value::Object(map) = &mut payload {
            map.extend(claims_to_json(&issued.claims, PROTOCOL_CLAIMS));
        }

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.credential.kid().to_string());

        encode(&header, &payload, self.credential.encoding_key())
            .map_err(|e| OidcError::Internal(format!("failed to sign JWT: {e}")))
    }

    /// Validate signature, issuer, audience and lifetime; return the payload.
    pub fn validate(&self, token: &str, issuer: &str) -> Result<Value, OidcError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let data = decode::<Value>(token, self.credential.decoding_key(), &validation)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired".to_string(),
                    ErrorKind::InvalidIssuer => "invalid issuer".to_string(),
                    ErrorKind::InvalidAudience => "invalid audience".to_string(),
                    _ => format!("invalid token: {e}"),
                };
                warn!(%reason, "Access token rejected");
                OidcError::Unauthorized(reason)
            })?;

        let sub = data
            .claims
            .get("sub")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        debug!(%sub, "Access token validated");
        Ok(data.claims)
    }

    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_secs
    }
}

fn now_secs() -> Result<u64, OidcError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| OidcError::Internal(format!("system clock error: {e}")))
}
