//! Claim vocabulary.
//!
//! Claim types form a closed set; anything else parses to
//! [`ClaimType::Unrecognized`] and is never emitted into a token.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A claim type relying parties understand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimType {
    /// `sub`. Set by the token service from the subject id; an issued
    /// claim of this type never reaches a token.
    Subject,
    /// `name`
    Name,
    /// `role` (multi-valued)
    Role,
    /// `email`
    Email,
    /// `idp`: identity provider that authenticated the subject. Set by the
    /// token service from the subject's `idp` attribute; an issued claim of
    /// this type never reaches a token.
    IdentityProvider,
    /// `amr`: authentication methods (multi-valued). Set by the token service
    /// from the grant; an issued claim of this type never reaches a token.
    AuthenticationMethod,
    /// Any other claim name. Rejected at startup in mappings, dropped at issuance.
    Unrecognized(String),
}

impl ClaimType {
    /// Every recognized claim type, in discovery order.
    pub fn recognized() -> [ClaimType; 6] {
        [
            ClaimType::Subject,
            ClaimType::Name,
            ClaimType::Role,
            ClaimType::Email,
            ClaimType::IdentityProvider,
            ClaimType::AuthenticationMethod,
        ]
    }

    /// Parse a JWT claim name. Claim names are case-sensitive.
    pub fn parse(name: &str) -> Self {
        match name {
            "sub" => ClaimType::Subject,
            "name" => ClaimType::Name,
            "role" => ClaimType::Role,
            "email" => ClaimType::Email,
            "idp" => ClaimType::IdentityProvider,
            "amr" => ClaimType::AuthenticationMethod,
            other => ClaimType::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ClaimType::Subject => "sub",
            ClaimType::Name => "name",
            ClaimType::Role => "role",
            ClaimType::Email => "email",
            ClaimType::IdentityProvider => "idp",
            ClaimType::AuthenticationMethod => "amr",
            ClaimType::Unrecognized(name) => name,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ClaimType::Unrecognized(_))
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ClaimType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A `(type, value)` pair attached to an issued token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: ClaimType, value: impl Into<String>) -> Self {
        Self {
            claim_type,
            value: value.into(),
        }
    }

    pub fn role(value: impl Into<String>) -> Self {
        Self::new(ClaimType::Role, value)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(ClaimType::Name, value)
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.claim_type, self.value)
    }
}

/// Render claims as JWT payload members.
///
/// A type that occurs once becomes a string, a type that occurs several
/// times becomes an array (in issuance order, duplicates kept). Types listed
/// in `reserved` are skipped.
pub fn claims_to_json(claims: &[Claim], reserved: &[&str]) -> Map<String, Value> {
    let mut out = Map::new();
    for claim in claims {
        let key = claim.claim_type.as_str();
        if reserved.contains(&key) {
            tracing::warn!(claim = %key, "Ignoring issued claim that collides with a protocol claim");
            continue;
        }
        let value = Value::String(claim.value.clone());
        match out.get_mut(key) {
            None => {
                out.insert(key.to_string(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    out
}
