//! Claims issuance and embedded OIDC endpoints for idfed.
//!
//! The pipeline for every token and userinfo request:
//!
//! 1. a [`Subject`] is resolved (local test user or federated login),
//! 2. the [`ProfileService`] reports whether it is active,
//! 3. the profile service appends claims, usually through a [`ClaimsPolicy`],
//! 4. the [`ClaimsIssuer`] drops unrecognized claim types and the token is signed.
//!
//! # Example
//!
//! ```ignore
//! use idfed_core::prelude::*;
//! use idfed_oidc::{IdentityServer, InMemoryUserStore, LocalUser};
//!
//! let users = InMemoryUserStore::new()
//!     .add_user("alice", "alice", LocalUser::new("1").with_name("Alice"))?;
//!
//! let identity = IdentityServer::new()
//!     .with_user_store(users)
//!     .build()?;
//!
//! AppBuilder::new()
//!     .path_base(PathBase::parse("/idservice")?)
//!     .with(identity)
//!     .serve("0.0.0.0:5000")
//!     .await?;
//! ```

pub mod claims;
pub mod error;
pub mod federation;
pub mod issuance;
pub mod keys;
pub mod policy;
pub mod profile;
pub mod settings;
pub mod store;
pub mod subject;
pub mod token;

mod handlers;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use idfed_core::{AppBuilder, IdfedConfig, Plugin};
use tracing::info;

pub use claims::{Claim, ClaimType};
pub use error::{ConfigurationError, MissingIdentityError, OidcError};
pub use federation::{
    ClaimMapping, ExternalLogin, ExternalSchemes, FederationConfig, ResponseType,
};
pub use issuance::{ClaimsIssuer, InactiveSubjectHandling, IssuedClaims};
pub use keys::SigningCredential;
pub use policy::{ClaimsPolicy, Evaluation, StaticRolePolicy};
pub use profile::{
    DefaultProfileService, IsActiveContext, ProfileDataRequestContext, ProfileService,
};
pub use settings::IdentityServerSettings;
pub use store::{InMemoryUserStore, LocalUser, UserStore};
pub use subject::Subject;

/// Builder for the embedded identity server.
pub struct IdentityServer {
    settings: IdentityServerSettings,
    user_store: Option<Box<dyn store::UserStoreErased>>,
    claims_issuer: Option<ClaimsIssuer>,
    schemes: ExternalSchemes,
    credential: Option<SigningCredential>,
}

impl IdentityServer {
    /// Defaults: root path base, audience `api`, TTL 3600s, static roles
    /// `Administrator` and `User`, ephemeral signing key.
    pub fn new() -> Self {
        Self::with_settings(IdentityServerSettings::default())
    }

    pub fn with_settings(settings: IdentityServerSettings) -> Self {
        Self {
            settings,
            user_store: None,
            claims_issuer: None,
            schemes: ExternalSchemes::new(),
            credential: None,
        }
    }

    /// Wire everything from configuration: settings, test users and the
    /// optional federation binding. Any error is fatal.
    pub fn from_config(config: &IdfedConfig) -> Result<Self, ConfigurationError> {
        let settings: IdentityServerSettings = config.section()?;
        let users = InMemoryUserStore::from_config(config)?;
        let mut server = Self::with_settings(settings).with_user_store(users);
        if let Some(federation) = FederationConfig::from_config(config)? {
            server = server.with_external_scheme(federation)?;
        } else {
            info!("No federation authority configured, external login disabled");
        }
        Ok(server)
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.settings.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.settings.audience = audience.into();
        self
    }

    pub fn token_ttl(mut self, secs: u64) -> Self {
        self.settings.token_ttl_secs = secs;
        self
    }

    pub fn inactive_subject(mut self, handling: InactiveSubjectHandling) -> Self {
        self.settings.inactive_subject = handling;
        self
    }

    pub fn with_user_store(mut self, store: impl UserStore) -> Self {
        self.user_store = Some(Box::new(store));
        self
    }

    /// Replace the default profile service (static roles from settings).
    pub fn with_profile_service(mut self, service: impl ProfileService) -> Self {
        self.claims_issuer = Some(ClaimsIssuer::new(service));
        self
    }

    pub fn with_external_scheme(
        mut self,
        federation: FederationConfig,
    ) -> Result<Self, ConfigurationError> {
        self.schemes = self.schemes.register(federation)?;
        Ok(self)
    }

    pub fn with_signing_credential(mut self, credential: SigningCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn settings(&self) -> &IdentityServerSettings {
        &self.settings
    }

    /// Create key material and shared state.
    pub fn build(self) -> Result<IdentityServerRuntime, ConfigurationError> {
        let settings = self.settings;
        let credential = match (self.credential, &settings.signing_key_path) {
            (Some(credential), _) => credential,
            (None, Some(path)) => SigningCredential::load_or_create(path, &settings.kid)?,
            (None, None) => SigningCredential::generate(&settings.kid)?,
        };
        let credential = Arc::new(credential);

        let claims_issuer = self
            .claims_issuer
            .unwrap_or_else(|| {
                ClaimsIssuer::new(DefaultProfileService::new(StaticRolePolicy::new(
                    settings.roles.clone(),
                )))
            })
            .with_timeout(settings.profile_timeout)
            .with_inactive_handling(settings.inactive_subject);

        let user_store = self
            .user_store
            .unwrap_or_else(|| Box::new(InMemoryUserStore::new()));

        info!(
            path_base = %settings.path_base,
            issuer = settings.issuer.as_deref().unwrap_or("<request origin>"),
            schemes = self.schemes.iter().count(),
            "Identity server configured"
        );

        let state = Arc::new(state::OidcState {
            token_service: token::TokenService::new(
                credential.clone(),
                settings.audience.clone(),
                settings.token_ttl_secs,
            ),
            credential,
            user_store,
            claims_issuer,
            schemes: self.schemes,
            issuer: settings.issuer.clone(),
        });
        Ok(IdentityServerRuntime { state, settings })
    }
}

impl Default for IdentityServer {
    fn default() -> Self {
        Self::new()
    }
}

/// A built identity server, installed into an [`AppBuilder`] as a plugin.
#[derive(Clone)]
pub struct IdentityServerRuntime {
    state: Arc<state::OidcState>,
    settings: IdentityServerSettings,
}

impl IdentityServerRuntime {
    pub fn settings(&self) -> &IdentityServerSettings {
        &self.settings
    }

    /// The OIDC router (no boundary layers).
    pub fn routes(&self) -> Router {
        Router::new()
            .route(
                "/.well-known/openid-configuration",
                get(handlers::discovery_handler),
            )
            .route(
                "/.well-known/openid-configuration/jwks",
                get(handlers::jwks_handler),
            )
            .route("/connect/token", post(handlers::token_handler))
            .route(
                "/connect/userinfo",
                get(handlers::userinfo_handler).post(handlers::userinfo_handler),
            )
            .route(
                "/external/challenge/{scheme}",
                get(handlers::challenge_handler),
            )
            .with_state(self.state.clone())
    }
}

impl Plugin for IdentityServerRuntime {
    fn install(self, app: AppBuilder) -> AppBuilder {
        app.register_routes(self.routes())
    }
}

pub mod prelude {
    //! Re-exports of the most commonly used identity-server types.
    pub use crate::{
        Claim, ClaimType, ClaimsPolicy, DefaultProfileService, IdentityServer,
        InMemoryUserStore, LocalUser, ProfileService, StaticRolePolicy, Subject, UserStore,
    };
}
