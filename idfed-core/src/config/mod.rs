mod loader;
pub mod secrets;
pub mod value;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

pub use secrets::{DefaultSecretResolver, SecretResolver};
pub use value::{ConfigValue, FromConfigValue};

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// The value has the right type but is not acceptable.
    Invalid { key: String, message: String },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(
                f,
                "Config key not found: {key} (set env var `{}`)",
                env_var_name(key)
            ),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A strongly-typed view over a prefix of the configuration key space.
///
/// ```ignore
/// struct PeerSettings { timeout_ms: u64 }
///
/// impl ConfigSection for PeerSettings {
///     fn prefix() -> &'static str { "peers" }
///     fn from_config(config: &IdfedConfig) -> Result<Self, ConfigError> {
///         Ok(Self { timeout_ms: config.get_or("peers.timeout_ms", 5000) })
///     }
/// }
///
/// let peers = config.section::<PeerSettings>()?;
/// ```
pub trait ConfigSection: Sized {
    /// The configuration key prefix (e.g., `"federation"`).
    fn prefix() -> &'static str;

    /// Construct and validate the section from the raw configuration.
    fn from_config(config: &IdfedConfig) -> Result<Self, ConfigError>;
}

/// Application configuration loaded from YAML files, `.env` files, and environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `application.yaml` (base)
/// 2. `application-{profile}.yaml` (profile override)
/// 3. `.env` then `.env.{profile}` (loaded into the process environment, never overwriting)
/// 4. `${...}` placeholders in string values
/// 5. Environment variables (`SERVER_PATH_BASE` overrides `server.path_base`)
///
/// The profile is `IDFED_PROFILE` if set, otherwise the argument passed to `load`.
#[derive(Debug, Clone)]
pub struct IdfedConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl IdfedConfig {
    /// Load configuration from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from_dir(Path::new("."), profile, &DefaultSecretResolver)
    }

    /// Load configuration files from `dir` with a custom secret resolver.
    pub fn load_from_dir(
        dir: &Path,
        profile: &str,
        resolver: &dyn SecretResolver,
    ) -> Result<Self, ConfigError> {
        let active_profile =
            std::env::var("IDFED_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();
        loader::load_yaml_file(&dir.join("application.yaml"), &mut values)?;
        loader::load_yaml_file(
            &dir.join(format!("application-{active_profile}.yaml")),
            &mut values,
        )?;

        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{active_profile}")));

        resolve_string_values(&mut values, resolver)?;
        overlay_env(&mut values, std::env::vars());

        tracing::debug!(
            profile = %active_profile,
            keys = values.len(),
            dir = %display_dir(dir),
            "Configuration loaded"
        );

        Ok(IdfedConfig {
            values,
            profile: active_profile,
        })
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        resolve_string_values(&mut values, &DefaultSecretResolver)?;
        Ok(IdfedConfig {
            values,
            profile: profile.to_string(),
        })
    }

    /// Create an empty config (useful for testing).
    pub fn empty() -> Self {
        IdfedConfig {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    /// Set a value programmatically.
    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Get a typed value for the given dot-separated key.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Get a typed value, returning a default if the key is missing.
    ///
    /// A present value of the wrong type is still an error.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.get(key) {
            Err(ConfigError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    /// Get an optional value; missing and `null` both map to `None`.
    pub fn get_opt<V: FromConfigValue>(&self, key: &str) -> Result<Option<V>, ConfigError> {
        match self.values.get(key) {
            None | Some(ConfigValue::Null) => Ok(None),
            Some(value) => V::from_config_value(value, key).map(Some),
        }
    }

    /// Check whether a key exists in the config.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Distinct child segments directly under `prefix`, sorted.
    ///
    /// With `peers.services.a.url` and `peers.services.b.url` loaded,
    /// `children("peers.services")` returns `["a", "b"]`.
    pub fn children(&self, prefix: &str) -> Vec<String> {
        let lead = format!("{prefix}.");
        let names: BTreeSet<&str> = self
            .values
            .keys()
            .filter_map(|k| k.strip_prefix(&lead))
            .filter_map(|rest| rest.split('.').next())
            .filter(|segment| !segment.is_empty())
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// Build a typed section.
    pub fn section<C: ConfigSection>(&self) -> Result<C, ConfigError> {
        C::from_config(self)
    }

    /// The active profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// Environment variable that overrides `key` (`server.path_base` -> `SERVER_PATH_BASE`).
pub fn env_var_name(key: &str) -> String {
    key.to_uppercase().replace(['.', '-'], "_")
}

/// Overlay environment variables onto the loaded values.
///
/// A variable whose name matches an existing key's env form replaces that
/// key, which keeps underscores inside segments intact (`SERVER_PATH_BASE`
/// targets `server.path_base`). Any other variable is added under its
/// lowercased, dot-separated name.
fn overlay_env(
    values: &mut HashMap<String, ConfigValue>,
    vars: impl Iterator<Item = (String, String)>,
) {
    let by_env: HashMap<String, String> = values
        .keys()
        .map(|k| (env_var_name(k), k.clone()))
        .collect();

    for (env_key, env_val) in vars {
        let config_key = by_env
            .get(&env_key)
            .cloned()
            .unwrap_or_else(|| env_key.to_lowercase().replace('_', "."));
        values.insert(config_key, ConfigValue::String(env_val));
    }
}

fn resolve_string_values(
    values: &mut HashMap<String, ConfigValue>,
    resolver: &dyn SecretResolver,
) -> Result<(), ConfigError> {
    for value in values.values_mut() {
        if let ConfigValue::String(s) = value {
            if s.contains("${") {
                *s = secrets::resolve_placeholders(s, resolver)?;
            }
        }
    }
    Ok(())
}

fn display_dir(dir: &Path) -> String {
    std::fs::canonicalize(dir)
        .unwrap_or_else(|_| PathBuf::from(dir))
        .display()
        .to_string()
}
