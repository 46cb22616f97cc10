//! Profile data provider.
//!
//! The token pipeline calls a [`ProfileService`] once per issuance: first
//! `is_active`, then `get_profile_data` to populate the claims.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::claims::Claim;
use crate::policy::{ClaimsPolicy, StaticRolePolicy};
use crate::subject::Subject;

/// Context for a single profile-data request.
///
/// The provider appends to the issued claims; it never reads or alters
/// claims owned by other stages.
#[derive(Debug)]
pub struct ProfileDataRequestContext {
    subject: Subject,
    caller: String,
    issued_claims: Vec<Claim>,
}

impl ProfileDataRequestContext {
    pub fn new(subject: Subject, caller: impl Into<String>) -> Self {
        Self {
            subject,
            caller: caller.into(),
            issued_claims: Vec::new(),
        }
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// The client or endpoint requesting the claims.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn add_claims(&mut self, claims: impl IntoIterator<Item = Claim>) {
        self.issued_claims.extend(claims);
    }

    pub fn issued_claims(&self) -> &[Claim] {
        &self.issued_claims
    }

    pub(crate) fn clear_issued_claims(&mut self) {
        self.issued_claims.clear();
    }

    pub fn into_parts(self) -> (Subject, Vec<Claim>) {
        (self.subject, self.issued_claims)
    }
}

/// Context for an is-active check.
#[derive(Debug, Clone)]
pub struct IsActiveContext {
    pub subject: Subject,
    pub caller: String,
}

impl IsActiveContext {
    pub fn new(subject: Subject, caller: impl Into<String>) -> Self {
        Self {
            subject,
            caller: caller.into(),
        }
    }
}

/// Hook consulted by the token pipeline.
///
/// Implement this trait to back issuance with your own account store
/// (deactivated users, per-tenant roles, etc.).
pub trait ProfileService: Send + Sync + 'static {
    /// Append the claims for `context.subject()` to the context.
    fn get_profile_data(
        &self,
        context: &mut ProfileDataRequestContext,
    ) -> impl Future<Output = ()> + Send;

    /// Whether the subject may receive tokens.
    fn is_active(&self, context: &IsActiveContext) -> impl Future<Output = bool> + Send;
}

/// Object-safe wrapper for `ProfileService`.
pub(crate) trait ProfileServiceErased: Send + Sync {
    fn get_profile_data<'a>(
        &'a self,
        context: &'a mut ProfileDataRequestContext,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
    fn is_active<'a>(
        &'a self,
        context: &'a IsActiveContext,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

impl<T: ProfileService> ProfileServiceErased for T {
    fn get_profile_data<'a>(
        &'a self,
        context: &'a mut ProfileDataRequestContext,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(ProfileService::get_profile_data(self, context))
    }

    fn is_active<'a>(
        &'a self,
        context: &'a IsActiveContext,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(ProfileService::is_active(self, context))
    }
}

/// Profile service that delegates claims to a [`ClaimsPolicy`] and treats
/// every subject as active.
#[derive(Debug, Clone, Default)]
pub struct DefaultProfileService<P = StaticRolePolicy> {
    policy: P,
}

impl<P: ClaimsPolicy> DefaultProfileService<P> {
    pub fn new(policy: P) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }
}

impl<P: ClaimsPolicy> ProfileService for DefaultProfileService<P> {
    fn get_profile_data(
        &self,
        context: &mut ProfileDataRequestContext,
    ) -> impl Future<Output = ()> + Send {
        let evaluation = self.policy.evaluate(context.subject());
        for missing in &evaluation.omitted {
            debug!(caller = context.caller(), %missing, "Claim omitted");
        }
        context.add_claims(evaluation.claims);
        std::future::ready(())
    }

    fn is_active(&self, _context: &IsActiveContext) -> impl Future<Output = bool> + Send {
        std::future::ready(true)
    }
}
