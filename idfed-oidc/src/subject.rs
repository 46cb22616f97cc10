use std::collections::BTreeMap;

/// Identity provider recorded for subjects authenticated locally.
pub const LOCAL_IDENTITY_PROVIDER: &str = "local";

/// The authenticated principal for which claims are issued.
///
/// Built from either a local test user or an upstream federated identity.
/// Read-only during a claims evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub display_name: Option<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Append a value to a (possibly multi-valued) attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_attribute(key, value);
        self
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Display name exactly as stored, unless absent or blank.
    pub fn resolved_display_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    /// First value of an attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn attribute_values(&self, key: &str) -> &[String] {
        self.attributes.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The `idp` attribute, or [`LOCAL_IDENTITY_PROVIDER`].
    pub fn identity_provider(&self) -> &str {
        self.attribute("idp").unwrap_or(LOCAL_IDENTITY_PROVIDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_display_name_is_unresolved() {
        assert_eq!(Subject::new("1").resolved_display_name(), None);
        assert_eq!(
            Subject::new("1").with_display_name("   ").resolved_display_name(),
            None
        );
        assert_eq!(
            Subject::new("1")
                .with_display_name(" Alice ")
                .resolved_display_name(),
            Some(" Alice ")
        );
    }

    #[test]
    fn attributes_are_multi_valued() {
        let subject = Subject::new("1")
            .with_attribute("role", "Reader")
            .with_attribute("role", "Writer");
        assert_eq!(subject.attribute("role"), Some("Reader"));
        assert_eq!(subject.attribute_values("role"), ["Reader", "Writer"]);
        assert!(subject.attribute_values("email").is_empty());
    }

    #[test]
    fn identity_provider_defaults_to_local() {
        assert_eq!(Subject::new("1").identity_provider(), "local");
        assert_eq!(
            Subject::new("1").with_attribute("idp", "aad").identity_provider(),
            "aad"
        );
    }
}
