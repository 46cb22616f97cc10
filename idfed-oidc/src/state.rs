use std::sync::Arc;

use idfed_core::RequestOrigin;

use crate::error::OidcError;
use crate::federation::ExternalSchemes;
use crate::issuance::ClaimsIssuer;
use crate::keys::SigningCredential;
use crate::store::UserStoreErased;
use crate::token::TokenService;

/// Internal shared state for the identity-server handlers.
pub(crate) struct OidcState {
    pub credential: Arc<SigningCredential>,
    pub token_service: TokenService,
    pub user_store: Box<dyn UserStoreErased>,
    pub claims_issuer: ClaimsIssuer,
    pub schemes: ExternalSchemes,
    pub issuer: Option<String>,
}

impl OidcState {
    /// The configured issuer, or the externally visible base URL.
    pub fn issuer_for(&self, origin: &RequestOrigin) -> String {
        self.issuer
            .clone()
            .unwrap_or_else(|| origin.base_url())
    }

    pub fn jwks_json_value(&self) -> Result<serde_json::Value, OidcError> {
        serde_json::to_value(self.credential.jwks())
            .map_err(|e| OidcError::Internal(format!("failed to serialize JWKS: {e}")))
    }
}
