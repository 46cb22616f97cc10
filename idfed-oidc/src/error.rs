use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use idfed_core::ConfigError;
use serde::Serialize;

/// OAuth 2.0 error response per RFC 6749 Section 5.2.
#[derive(Debug, Serialize)]
pub struct OidcErrorBody {
    pub error: &'static str,
    pub error_description: String,
}

/// Protocol-level error returned by the OIDC endpoints.
#[derive(Debug)]
pub enum OidcError {
    /// Malformed request or missing required parameters.
    InvalidRequest(String),
    /// Invalid resource-owner credentials.
    InvalidGrant(String),
    /// Unsupported grant type.
    UnsupportedGrantType(String),
    /// Missing or invalid Bearer token.
    Unauthorized(String),
    /// The profile service reported the subject as inactive.
    InactiveSubject(String),
    /// Unknown resource (e.g. external login scheme).
    NotFound(String),
    /// Internal server error.
    Internal(String),
}

impl OidcError {
    fn error_code(&self) -> &'static str {
        match self {
            OidcError::InvalidRequest(_) => "invalid_request",
            OidcError::InvalidGrant(_) | OidcError::InactiveSubject(_) => "invalid_grant",
            OidcError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OidcError::Unauthorized(_) => "invalid_token",
            OidcError::NotFound(_) => "not_found",
            OidcError::Internal(_) => "server_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            OidcError::InvalidRequest(_)
            | OidcError::InvalidGrant(_)
            | OidcError::UnsupportedGrantType(_)
            | OidcError::InactiveSubject(_) => StatusCode::BAD_REQUEST,
            OidcError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            OidcError::NotFound(_) => StatusCode::NOT_FOUND,
            OidcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn description(&self) -> String {
        match self {
            OidcError::InactiveSubject(sub) => format!("subject '{sub}' is not active"),
            OidcError::InvalidRequest(s)
            | OidcError::InvalidGrant(s)
            | OidcError::UnsupportedGrantType(s)
            | OidcError::Unauthorized(s)
            | OidcError::NotFound(s)
            | OidcError::Internal(s) => s.clone(),
        }
    }
}

impl IntoResponse for OidcError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = OidcErrorBody {
            error: self.error_code(),
            error_description: self.description(),
        };
        if status == StatusCode::UNAUTHORIZED {
            let challenge = format!("Bearer error=\"{}\"", body.error);
            return (
                status,
                [(axum::http::header::WWW_AUTHENTICATE, challenge)],
                Json(body),
            )
                .into_response();
        }
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for OidcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.description())
    }
}

impl std::error::Error for OidcError {}

/// A subject lacks an identity attribute a claim is derived from.
///
/// Never fatal: the affected claim is omitted and issuance continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingIdentityError {
    pub subject_id: String,
    pub attribute: &'static str,
}

impl MissingIdentityError {
    pub fn new(subject_id: impl Into<String>, attribute: &'static str) -> Self {
        Self {
            subject_id: subject_id.into(),
            attribute,
        }
    }
}

impl std::fmt::Display for MissingIdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.subject_id.is_empty() {
            write!(f, "subject has no resolvable {}", self.attribute)
        } else {
            write!(
                f,
                "subject '{}' has no resolvable {}",
                self.subject_id, self.attribute
            )
        }
    }
}

impl std::error::Error for MissingIdentityError {}

/// Startup error. Fatal: the process must not start serving.
#[derive(Debug)]
pub enum ConfigurationError {
    /// Missing or mistyped configuration key.
    Config(ConfigError),
    /// Malformed external federation binding.
    Federation(String),
    /// Signing credential could not be created or loaded.
    SigningKey(String),
    /// Invalid test-user definition.
    Users(String),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::Config(e) => write!(f, "{e}"),
            ConfigurationError::Federation(msg) => write!(f, "Invalid federation config: {msg}"),
            ConfigurationError::SigningKey(msg) => write!(f, "Signing key error: {msg}"),
            ConfigurationError::Users(msg) => write!(f, "Invalid user definition: {msg}"),
        }
    }
}

impl std::error::Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigurationError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ConfigurationError {
    fn from(err: ConfigError) -> Self {
        ConfigurationError::Config(err)
    }
}
