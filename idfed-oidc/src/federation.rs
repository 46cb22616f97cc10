//! External identity federation.
//!
//! Each [`FederationConfig`] binds one upstream OpenID Connect provider as a
//! named external login scheme. Bindings are validated at startup; upstream
//! identities are translated into local [`Subject`]s with [`FederationConfig::map_subject`].

use idfed_core::{IdfedConfig, RequestOrigin};
use serde_json::{Map, Value};
use url::Url;

use crate::claims::ClaimType;
use crate::error::{ConfigurationError, MissingIdentityError};
use crate::subject::Subject;

/// Response type requested from the upstream authorization endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    IdToken,
    Code,
    CodeIdToken,
    IdTokenToken,
}

impl ResponseType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().replace('_', " ").as_str() {
            "id token" => Some(ResponseType::IdToken),
            "code" => Some(ResponseType::Code),
            "code id token" => Some(ResponseType::CodeIdToken),
            "id token token" => Some(ResponseType::IdTokenToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::IdToken => "id_token",
            ResponseType::Code => "code",
            ResponseType::CodeIdToken => "code id_token",
            ResponseType::IdTokenToken => "id_token token",
        }
    }
}

/// Local claim type to upstream claim name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimMapping {
    entries: Vec<(ClaimType, String)>,
}

impl ClaimMapping {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Map `local` to the upstream claim `upstream`, replacing any earlier entry.
    pub fn map(mut self, local: ClaimType, upstream: impl Into<String>) -> Self {
        let upstream = upstream.into();
        match self.entries.iter_mut().find(|(t, _)| *t == local) {
            Some(entry) => entry.1 = upstream,
            None => self.entries.push((local, upstream)),
        }
        self
    }

    pub fn upstream_name(&self, local: &ClaimType) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == local)
            .map(|(_, name)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClaimType, &str)> {
        self.entries.iter().map(|(t, name)| (t, name.as_str()))
    }
}

impl Default for ClaimMapping {
    /// `name` and `role` map to the upstream claims of the same name.
    fn default() -> Self {
        Self::new()
            .map(ClaimType::Name, "name")
            .map(ClaimType::Role, "role")
    }
}

/// An upstream login translated into a local subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLogin {
    pub scheme: String,
    pub subject: Subject,
    /// Upstream tokens, retained only when `save_tokens` is enabled.
    pub upstream_id_token: Option<String>,
}

/// One external login scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederationConfig {
    pub scheme: String,
    pub display_name: String,
    pub authority: String,
    pub authorization_endpoint: Option<String>,
    pub client_id: String,
    pub response_type: ResponseType,
    pub sign_in_scheme: String,
    pub sign_out_scheme: String,
    pub callback_path: String,
    pub save_tokens: bool,
    pub claim_mapping: ClaimMapping,
}

impl FederationConfig {
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            display_name: "External".into(),
            authority: authority.into(),
            authorization_endpoint: None,
            client_id: client_id.into(),
            response_type: ResponseType::default(),
            sign_in_scheme: "idsrv.external".into(),
            sign_out_scheme: "idsrv".into(),
            callback_path: "/signin-oidc".into(),
            save_tokens: true,
            claim_mapping: ClaimMapping::default(),
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    pub fn save_tokens(mut self, save: bool) -> Self {
        self.save_tokens = save;
        self
    }

    pub fn claim_mapping(mut self, mapping: ClaimMapping) -> Self {
        self.claim_mapping = mapping;
        self
    }

    /// Read the `federation` section. Returns `Ok(None)` when no authority
    /// is configured.
    ///
    /// ```yaml
    /// federation:
    ///   scheme: aad
    ///   authority: https://login.microsoftonline.com/<tenant>/v2.0
    ///   client_id: 1f2e...
    ///   claim_mapping:
    ///     name: name
    ///     role: roles
    /// ```
    pub fn from_config(config: &IdfedConfig) -> Result<Option<Self>, ConfigurationError> {
        let Some(authority) = config.get_opt::<String>("federation.authority")? else {
            return Ok(None);
        };
        let defaults = FederationConfig::new("oidc", authority, "");

        let response_type = match config.get_opt::<String>("federation.response_type")? {
            None => defaults.response_type,
            Some(raw) => ResponseType::parse(&raw).ok_or_else(|| {
                ConfigurationError::Federation(format!("unsupported response_type '{raw}'"))
            })?,
        };

        let mapping_keys = config.children("federation.claim_mapping");
        let claim_mapping = if mapping_keys.is_empty() {
            defaults.claim_mapping.clone()
        } else {
            let mut mapping = ClaimMapping::new();
            for key in mapping_keys {
                let upstream: String = config.get(&format!("federation.claim_mapping.{key}"))?;
                mapping = mapping.map(ClaimType::parse(&key), upstream);
            }
            mapping
        };

        let federation = FederationConfig {
            scheme: config.get_or("federation.scheme", defaults.scheme)?,
            display_name: config.get_or("federation.display_name", defaults.display_name)?,
            authority: defaults.authority,
            authorization_endpoint: config.get_opt("federation.authorization_endpoint")?,
            client_id: config.get_or("federation.client_id", defaults.client_id)?,
            response_type,
            sign_in_scheme: config.get_or("federation.sign_in_scheme", defaults.sign_in_scheme)?,
            sign_out_scheme: config
                .get_or("federation.sign_out_scheme", defaults.sign_out_scheme)?,
            callback_path: config.get_or("federation.callback_path", defaults.callback_path)?,
            save_tokens: config.get_or("federation.save_tokens", defaults.save_tokens)?,
            claim_mapping,
        };
        federation.validate()?;
        Ok(Some(federation))
    }

    /// Reject malformed bindings. Called once at startup; failure is fatal.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let fail = |msg: String| Err(ConfigurationError::Federation(format!("[{}] {msg}", self.scheme)));

        if self.scheme.trim().is_empty() {
            return Err(ConfigurationError::Federation("scheme name is empty".into()));
        }
        self.authority_url()?;
        if let Some(endpoint) = &self.authorization_endpoint {
            parse_http_url(endpoint).map_err(|msg| {
                ConfigurationError::Federation(format!(
                    "[{}] authorization_endpoint {msg}",
                    self.scheme
                ))
            })?;
        }
        if self.client_id.trim().is_empty() {
            return fail("client_id is empty".into());
        }
        if self.sign_in_scheme.trim().is_empty() || self.sign_out_scheme.trim().is_empty() {
            return fail("sign-in and sign-out scheme names must not be empty".into());
        }
        if !self.callback_path.starts_with('/') {
            return fail(format!(
                "callback_path '{}' must start with '/'",
                self.callback_path
            ));
        }
        for (local, upstream) in self.claim_mapping.iter() {
            if !local.is_recognized() {
                return fail(format!("claim_mapping uses unrecognized claim type '{local}'"));
            }
            if upstream.trim().is_empty() {
                return fail(format!("claim_mapping for '{local}' has an empty upstream name"));
            }
        }
        Ok(())
    }

    fn authority_url(&self) -> Result<Url, ConfigurationError> {
        parse_http_url(&self.authority).map_err(|msg| {
            ConfigurationError::Federation(format!("[{}] authority {msg}", self.scheme))
        })
    }

    fn authorization_url(&self) -> Result<Url, ConfigurationError> {
        match &self.authorization_endpoint {
            Some(endpoint) => parse_http_url(endpoint).map_err(ConfigurationError::Federation),
            None => {
                let authority = self.authority.trim_end_matches('/');
                parse_http_url(&format!("{authority}/authorize"))
                    .map_err(ConfigurationError::Federation)
            }
        }
    }

    /// Callback URL the upstream provider posts back to.
    pub fn redirect_uri(&self, origin: &RequestOrigin) -> String {
        origin.absolute_url(&self.callback_path)
    }

    /// Upstream authorization URL for a sign-in challenge.
    ///
    /// The callback is built from the request origin, so it carries the
    /// path base and any forwarded scheme and host.
    pub fn challenge_url(
        &self,
        origin: &RequestOrigin,
        state: &str,
        nonce: &str,
    ) -> Result<Url, ConfigurationError> {
        let mut url = self.authorization_url()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", self.response_type.as_str())
            .append_pair("response_mode", "form_post")
            .append_pair("scope", "openid profile")
            .append_pair("redirect_uri", &self.redirect_uri(origin))
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url)
    }

    /// Translate upstream claims into a local subject.
    ///
    /// `sub` becomes the subject id, the mapped name claim the display
    /// name; every other mapped claim lands in the attributes under its
    /// local type name, unmapped string claims under their upstream name.
    /// `idp` is always set to this scheme.
    pub fn map_subject(&self, upstream: &Map<String, Value>) -> Result<Subject, MissingIdentityError> {
        let id = upstream
            .get("sub")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MissingIdentityError::new("", "subject identifier"))?;
        let mut subject = Subject::new(id);

        let mut consumed = vec!["sub"];
        for (local, upstream_name) in self.claim_mapping.iter() {
            consumed.push(upstream_name);
            let values = claim_values(upstream.get(upstream_name));
            match local {
                ClaimType::Name => subject.display_name = values.into_iter().next(),
                ClaimType::Subject | ClaimType::IdentityProvider => {}
                other => {
                    for value in values {
                        subject.add_attribute(other.as_str(), value);
                    }
                }
            }
        }

        for (name, value) in upstream {
            if consumed.contains(&name.as_str()) || name == "idp" {
                continue;
            }
            for value in claim_values(Some(value)) {
                subject.add_attribute(name.as_str(), value);
            }
        }

        subject
            .attributes
            .insert("idp".to_string(), vec![self.scheme.clone()]);
        Ok(subject)
    }

    /// Complete an upstream login: map the subject and retain the upstream
    /// token when `save_tokens` is on.
    pub fn complete_login(
        &self,
        upstream: &Map<String, Value>,
        id_token: &str,
    ) -> Result<ExternalLogin, MissingIdentityError> {
        Ok(ExternalLogin {
            scheme: self.scheme.clone(),
            subject: self.map_subject(upstream)?,
            upstream_id_token: self.save_tokens.then(|| id_token.to_string()),
        })
    }
}

fn parse_http_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("'{raw}' is not an absolute URL: {e}"))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(format!("'{raw}' must be an http(s) URL with a host")),
    }
}

fn claim_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Number(n)) => vec![n.to_string()],
        Some(Value::Bool(b)) => vec![b.to_string()],
        _ => Vec::new(),
    }
}

/// Registry of external login schemes, keyed by scheme name.
#[derive(Clone, Debug, Default)]
pub struct ExternalSchemes {
    schemes: Vec<FederationConfig>,
}

impl ExternalSchemes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a scheme. Duplicate names are rejected.
    pub fn register(mut self, config: FederationConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        if self.get(&config.scheme).is_some() {
            return Err(ConfigurationError::Federation(format!(
                "scheme '{}' is registered twice",
                config.scheme
            )));
        }
        tracing::info!(
            scheme = %config.scheme,
            authority = %config.authority,
            "External login scheme registered"
        );
        self.schemes.push(config);
        Ok(self)
    }

    pub fn get(&self, scheme: &str) -> Option<&FederationConfig> {
        self.schemes.iter().find(|s| s.scheme == scheme)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FederationConfig> {
        self.schemes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}
