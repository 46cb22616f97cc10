//! Claims issuance pipeline.
//!
//! Runs the profile service for one subject: an is-active gate followed by
//! claim collection, both bounded by a timeout. Timeouts fail closed.

use std::sync::Arc;
use std::time::Duration;

use idfed_core::config::{ConfigError, ConfigValue, FromConfigValue};
use tracing::{debug, info, warn};

use crate::claims::Claim;
use crate::error::OidcError;
use crate::profile::{
    IsActiveContext, ProfileDataRequestContext, ProfileService, ProfileServiceErased,
};
use crate::subject::Subject;

/// Default bound for each profile-service call.
pub const DEFAULT_PROFILE_TIMEOUT: Duration = Duration::from_secs(2);

/// What happens when the profile service reports a subject as inactive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InactiveSubjectHandling {
    /// No token is issued; the token endpoint answers `invalid_grant`.
    #[default]
    RefuseIssuance,
    /// A token is issued with protocol claims only.
    StripClaims,
}

impl FromConfigValue for InactiveSubjectHandling {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        let raw = String::from_config_value(value, key)?;
        match raw.to_ascii_lowercase().as_str() {
            "refuse" | "refuse_issuance" => Ok(InactiveSubjectHandling::RefuseIssuance),
            "strip" | "strip_claims" => Ok(InactiveSubjectHandling::StripClaims),
            other => Err(ConfigError::Invalid {
                key: key.to_string(),
                message: format!("expected 'refuse' or 'strip', got '{other}'"),
            }),
        }
    }
}

/// Result of one issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedClaims {
    pub subject: Subject,
    pub claims: Vec<Claim>,
    pub active: bool,
}

/// Runs a [`ProfileService`] for token and userinfo requests.
#[derive(Clone)]
pub struct ClaimsIssuer {
    profile: Arc<dyn ProfileServiceErased>,
    timeout: Duration,
    inactive: InactiveSubjectHandling,
}

impl ClaimsIssuer {
    pub fn new(profile: impl ProfileService) -> Self {
        Self {
            profile: Arc::new(profile),
            timeout: DEFAULT_PROFILE_TIMEOUT,
            inactive: InactiveSubjectHandling::default(),
        }
    }

    /// Bound applied to each profile-service call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_inactive_handling(mut self, handling: InactiveSubjectHandling) -> Self {
        self.inactive = handling;
        self
    }

    pub fn inactive_handling(&self) -> InactiveSubjectHandling {
        self.inactive
    }

    /// Ask the profile service whether `subject` may receive tokens.
    ///
    /// A call that exceeds the timeout counts as inactive.
    pub async fn is_active(&self, subject: &Subject, caller: &str) -> bool {
        let context = IsActiveContext::new(subject.clone(), caller);
        match tokio::time::timeout(self.timeout, self.profile.is_active(&context)).await {
            Ok(active) => active,
            Err(_) => {
                warn!(
                    subject = %subject.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Profile is_active timed out, treating subject as inactive"
                );
                false
            }
        }
    }

    /// Collect the claims for `subject`.
    ///
    /// Unrecognized claim types are dropped. An inactive subject is either
    /// refused ([`OidcError::InactiveSubject`]) or receives no claims,
    /// depending on [`InactiveSubjectHandling`].
    pub async fn issue(&self, subject: Subject, caller: &str) -> Result<IssuedClaims, OidcError> {
        if !self.is_active(&subject, caller).await {
            return match self.inactive {
                InactiveSubjectHandling::RefuseIssuance => {
                    warn!(subject = %subject.id, caller, "Refusing issuance for inactive subject");
                    Err(OidcError::InactiveSubject(subject.id))
                }
                InactiveSubjectHandling::StripClaims => {
                    info!(subject = %subject.id, caller, "Inactive subject, issuing without claims");
                    Ok(IssuedClaims {
                        subject,
                        claims: Vec::new(),
                        active: false,
                    })
                }
            };
        }

        let mut context = ProfileDataRequestContext::new(subject, caller);
        let outcome =
            tokio::time::timeout(self.timeout, self.profile.get_profile_data(&mut context)).await;
        if outcome.is_err() {
            warn!(
                subject = %context.subject().id,
                timeout_ms = self.timeout.as_millis() as u64,
                "Profile get_profile_data timed out, issuing without claims"
            );
            context.clear_issued_claims();
        }

        let (subject, collected) = context.into_parts();
        let claims: Vec<Claim> = collected
            .into_iter()
            .filter(|claim| {
                let keep = claim.claim_type.is_recognized();
                if !keep {
                    warn!(
                        claim = %claim.claim_type,
                        subject = %subject.id,
                        "Dropping unrecognized claim type"
                    );
                }
                keep
            })
            .collect();

        debug!(subject = %subject.id, caller, count = claims.len(), "Claims issued");
        Ok(IssuedClaims {
            subject,
            claims,
            active: true,
        })
    }
}

impl std::fmt::Debug for ClaimsIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimsIssuer")
            .field("timeout", &self.timeout)
            .field("inactive", &self.inactive)
            .finish_non_exhaustive()
    }
}
