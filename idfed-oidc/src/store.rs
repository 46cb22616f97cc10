use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use dashmap::DashMap;
use idfed_core::IdfedConfig;

use crate::error::ConfigurationError;
use crate::subject::Subject;

/// A locally defined account, used by the password grant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalUser {
    pub subject_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl LocalUser {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The subject claims are issued for.
    pub fn to_subject(&self) -> Subject {
        let mut subject = Subject {
            id: self.subject_id.clone(),
            display_name: self.display_name.clone(),
            attributes: self.attributes.clone(),
        };
        if let Some(email) = &self.email {
            subject.add_attribute("email", email.clone());
        }
        subject
    }
}

/// Pluggable account store for the password grant and userinfo.
pub trait UserStore: Send + Sync + 'static {
    /// Find a user by username (used during password grant).
    fn find_by_username(&self, username: &str) -> impl Future<Output = Option<LocalUser>> + Send;
    /// Verify a user's password.
    fn verify_password(&self, username: &str, password: &str) -> impl Future<Output = bool> + Send;
    /// Find a user by subject identifier (used by userinfo endpoint).
    fn find_by_subject(&self, subject_id: &str) -> impl Future<Output = Option<LocalUser>> + Send;
}

/// Object-safe wrapper for `UserStore`.
pub(crate) trait UserStoreErased: Send + Sync {
    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<LocalUser>> + Send + 'a>>;
    fn verify_password<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
    fn find_by_subject<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<LocalUser>> + Send + 'a>>;
}

impl<T: UserStore> UserStoreErased for T {
    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<LocalUser>> + Send + 'a>> {
        Box::pin(UserStore::find_by_username(self, username))
    }

    fn verify_password<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(UserStore::verify_password(self, username, password))
    }

    fn find_by_subject<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<LocalUser>> + Send + 'a>> {
        Box::pin(UserStore::find_by_subject(self, subject_id))
    }
}

/// In-memory test users. Passwords are hashed with argon2.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    /// username -> (user, password hash)
    users: Arc<DashMap<String, (LocalUser, String)>>,
    /// subject id -> username
    subject_index: Arc<DashMap<String, String>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with a plaintext password (hashed with argon2).
    pub fn add_user(
        self,
        username: impl Into<String>,
        password: &str,
        user: LocalUser,
    ) -> Result<Self, ConfigurationError> {
        let username = username.into();
        if username.is_empty() || user.subject_id.is_empty() {
            return Err(ConfigurationError::Users(
                "username and subject must not be empty".into(),
            ));
        }
        if self.subject_index.contains_key(&user.subject_id) {
            return Err(ConfigurationError::Users(format!(
                "subject '{}' is defined twice",
                user.subject_id
            )));
        }
        if self.users.contains_key(&username) {
            return Err(ConfigurationError::Users(format!(
                "username '{username}' is defined twice"
            )));
        }
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                ConfigurationError::Users(format!("cannot hash password for '{username}': {e}"))
            })?
            .to_string();

        self.subject_index
            .insert(user.subject_id.clone(), username.clone());
        self.users.insert(username, (user, password_hash));
        Ok(self)
    }

    /// Build the store from the `users` list.
    ///
    /// ```yaml
    /// users:
    ///   - subject: "1"
    ///     username: alice
    ///     password: alice
    ///     name: Alice
    ///     email: alice@example.com
    /// ```
    pub fn from_config(config: &IdfedConfig) -> Result<Self, ConfigurationError> {
        let mut indices: Vec<usize> = config
            .children("users")
            .iter()
            .filter_map(|segment| segment.parse().ok())
            .collect();
        indices.sort_unstable();

        let mut store = Self::new();
        for index in indices {
            let key = |field: &str| format!("users.{index}.{field}");
            let subject: String = config.get(&key("subject"))?;
            let username: String = config.get(&key("username"))?;
            let password: String = config.get(&key("password"))?;
            let mut user = LocalUser::new(subject);
            user.display_name = config.get_opt(&key("name"))?;
            user.email = config.get_opt(&key("email"))?;
            store = store.add_user(username, &password, user)?;
        }
        tracing::info!(count = store.len(), "Test users loaded");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserStore for InMemoryUserStore {
    fn find_by_username(&self, username: &str) -> impl Future<Output = Option<LocalUser>> + Send {
        let result = self
            .users
            .get(username)
            .map(|entry| entry.value().0.clone());
        async move { result }
    }

    fn verify_password(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = bool> + Send {
        let entry = self.users.get(username).map(|e| e.value().1.clone());
        let password = password.to_string();
        async move {
            let Some(hash_str) = entry else {
                return false;
            };
            tokio::task::spawn_blocking(move || {
                PasswordHash::new(&hash_str)
                    .map(|parsed| {
                        Argon2::default()
                            .verify_password(password.as_bytes(), &parsed)
                            .is_ok()
                    })
                    .unwrap_or(false)
            })
            .await
            .unwrap_or(false)
        }
    }

    fn find_by_subject(&self, subject_id: &str) -> impl Future<Output = Option<LocalUser>> + Send {
        let result = self.subject_index.get(subject_id).and_then(|username_ref| {
            self.users
                .get(username_ref.value())
                .map(|entry| entry.value().0.clone())
        });
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> LocalUser {
        LocalUser::new("1")
            .with_name("Alice")
            .with_email("alice@example.com")
    }

    #[tokio::test]
    async fn verify_and_lookup() {
        let store = InMemoryUserStore::new()
            .add_user("alice", "secret", alice())
            .unwrap();
        assert!(UserStore::verify_password(&store, "alice", "secret").await);
        assert!(!UserStore::verify_password(&store, "alice", "wrong").await);
        assert!(!UserStore::verify_password(&store, "bob", "secret").await);
        assert_eq!(
            UserStore::find_by_subject(&store, "1").await,
            Some(alice())
        );
        assert!(UserStore::find_by_username(&store, "bob").await.is_none());
    }

    #[test]
    fn duplicate_subject_is_rejected() {
        let store = InMemoryUserStore::new()
            .add_user("alice", "secret", alice())
            .unwrap();
        assert!(store.add_user("alice2", "secret", alice()).is_err());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = InMemoryUserStore::new()
            .add_user("alice", "secret", alice())
            .unwrap();
        let result = store
            .clone()
            .add_user("alice", "other", LocalUser::new("2").with_name("Mallory"));
        assert!(matches!(result, Err(ConfigurationError::Users(_))));
        assert_eq!(
            UserStore::find_by_subject(&store, "1").await,
            Some(alice())
        );
        assert!(UserStore::find_by_subject(&store, "2").await.is_none());
    }

    #[test]
    fn duplicate_username_in_config_is_fatal() {
        let yaml = r#"
users:
  - subject: "1"
    username: alice
    password: a
  - subject: "2"
    username: alice
    password: b
"#;
        let config = IdfedConfig::from_yaml_str(yaml, "test").unwrap();
        assert!(matches!(
            InMemoryUserStore::from_config(&config),
            Err(ConfigurationError::Users(_))
        ));
    }

    #[test]
    fn subject_carries_email_attribute() {
        let subject = alice().to_subject();
        assert_eq!(subject.id, "1");
        assert_eq!(subject.resolved_display_name(), Some("Alice"));
        assert_eq!(subject.attribute("email"), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn from_config_reads_user_list() {
        let yaml = r#"
users:
  - subject: "1"
    username: alice
    password: alice
    name: Alice
  - subject: "2"
    username: bob
    password: bob
    name: ""
"#;
        let config = IdfedConfig::from_yaml_str(yaml, "test").unwrap();
        let store = InMemoryUserStore::from_config(&config).unwrap();
        assert_eq!(store.len(), 2);
        let bob = UserStore::find_by_username(&store, "bob").await.unwrap();
        assert_eq!(bob.subject_id, "2");
        assert_eq!(bob.to_subject().resolved_display_name(), None);
    }

    #[test]
    fn from_config_requires_password() {
        let yaml = "users:\n  - subject: \"1\"\n    username: alice\n";
        let config = IdfedConfig::from_yaml_str(yaml, "test").unwrap();
        assert!(matches!(
            InMemoryUserStore::from_config(&config),
            Err(ConfigurationError::Config(_))
        ));
    }
}
