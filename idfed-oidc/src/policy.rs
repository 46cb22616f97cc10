//! Claims policy: which claims a subject receives.

use crate::claims::Claim;
use crate::error::MissingIdentityError;
use crate::subject::Subject;

/// Roles granted to every subject by [`StaticRolePolicy::default`].
pub const DEFAULT_ROLES: [&str; 2] = ["Administrator", "User"];

/// Output of a policy evaluation.
///
/// `omitted` lists the claims that could not be derived. They are
/// diagnostics only and never abort issuance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub claims: Vec<Claim>,
    pub omitted: Vec<MissingIdentityError>,
}

/// Decides the claims granted to a subject.
///
/// Evaluation must be deterministic for a given subject and must not
/// mutate it.
pub trait ClaimsPolicy: Send + Sync + 'static {
    fn evaluate(&self, subject: &Subject) -> Evaluation;
}

/// Grants a fixed role list to every subject plus their display name.
///
/// Roles are emitted in configuration order, duplicates kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRolePolicy {
    roles: Vec<String>,
}

impl StaticRolePolicy {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

impl Default for StaticRolePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ROLES)
    }
}

impl ClaimsPolicy for StaticRolePolicy {
    fn evaluate(&self, subject: &Subject) -> Evaluation {
        let mut evaluation = Evaluation {
            claims: self.roles.iter().map(Claim::role).collect(),
            omitted: Vec::new(),
        };
        match subject.resolved_display_name() {
            Some(name) => evaluation.claims.push(Claim::name(name)),
            None => evaluation
                .omitted
                .push(MissingIdentityError::new(&subject.id, "display name")),
        }
        evaluation
    }
}
