use std::path::PathBuf;
use std::time::Duration;

use idfed_core::{ConfigError, ConfigSection, IdfedConfig, PathBase};

use crate::issuance::{InactiveSubjectHandling, DEFAULT_PROFILE_TIMEOUT};
use crate::policy::DEFAULT_ROLES;

/// Settings for the embedded identity server.
///
/// ```yaml
/// server:
///   path_base: /idservice
/// oidc:
///   audience: api
///   token_ttl_secs: 3600
///   signing_key_path: tempkey.pem
///   inactive_subject: refuse
/// profile:
///   timeout_ms: 2000
/// claims:
///   roles: [Administrator, User]
/// ```
#[derive(Clone, Debug)]
pub struct IdentityServerSettings {
    /// Required. `/` means the service is served at the root.
    pub path_base: PathBase,
    /// Fixed `iss` value. When unset, the issuer is the request's base URL.
    pub issuer: Option<String>,
    pub audience: String,
    pub token_ttl_secs: u64,
    pub kid: String,
    /// Persisted developer credential. When unset, an ephemeral key is generated.
    pub signing_key_path: Option<PathBuf>,
    pub inactive_subject: InactiveSubjectHandling,
    pub profile_timeout: Duration,
    pub roles: Vec<String>,
}

impl Default for IdentityServerSettings {
    fn default() -> Self {
        Self {
            path_base: PathBase::root(),
            issuer: None,
            audience: "api".into(),
            token_ttl_secs: 3600,
            kid: "idfed-signing-key-1".into(),
            signing_key_path: None,
            inactive_subject: InactiveSubjectHandling::default(),
            profile_timeout: DEFAULT_PROFILE_TIMEOUT,
            roles: DEFAULT_ROLES.iter().map(|r| r.to_string()).collect(),
        }
    }
}

impl ConfigSection for IdentityServerSettings {
    fn prefix() -> &'static str {
        "oidc"
    }

    fn from_config(config: &IdfedConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            path_base: config.get("server.path_base")?,
            issuer: config
                .get_opt::<String>("oidc.issuer")?
                .filter(|issuer| !issuer.trim().is_empty()),
            audience: config.get_or("oidc.audience", defaults.audience)?,
            token_ttl_secs: config.get_or("oidc.token_ttl_secs", defaults.token_ttl_secs)?,
            kid: config.get_or("oidc.kid", defaults.kid)?,
            signing_key_path: config
                .get_opt::<String>("oidc.signing_key_path")?
                .map(PathBuf::from),
            inactive_subject: config.get_or("oidc.inactive_subject", defaults.inactive_subject)?,
            profile_timeout: config.get_or("profile.timeout_ms", defaults.profile_timeout)?,
            roles: config.get_or("claims.roles", defaults.roles)?,
        })
    }
}
