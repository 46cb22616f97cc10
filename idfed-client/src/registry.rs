use std::collections::BTreeMap;
use std::time::Duration;

use idfed_core::{ConfigError, ConfigSection, IdfedConfig};
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// A configured peer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Name used in log lines and degraded messages.
    pub display_name: String,
    pub base_url: Url,
}

impl Peer {
    /// `base_url` joined with `resource_path`, with exactly one `/` between them.
    pub fn resource_url(&self, resource_path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            resource_path.trim_start_matches('/')
        )
    }
}

/// Peer name → base address.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: BTreeMap<String, Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer under `name`. The display name defaults to `name`.
    pub fn with_peer(mut self, name: impl Into<String>, base_url: Url) -> Self {
        let name = name.into();
        self.peers.insert(
            name.clone(),
            Peer {
                display_name: name,
                base_url,
            },
        );
        self
    }

    pub fn with_display_name(mut self, name: &str, display_name: impl Into<String>) -> Self {
        if let Some(peer) = self.peers.get_mut(name) {
            peer.display_name = display_name.into();
        }
        self
    }

    pub fn resolve(&self, name: &str) -> Option<&Peer> {
        self.peers.get(name)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Read every `peers.services.<name>.url` (and optional `display_name`).
    pub fn from_config(config: &IdfedConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for name in config.children("peers.services") {
            let key = format!("peers.services.{name}.url");
            let raw: String = config.get(&key)?;
            let base_url = parse_base_url(&key, &raw)?;
            registry = registry.with_peer(name.clone(), base_url);
            if let Some(display) =
                config.get_opt::<String>(&format!("peers.services.{name}.display_name"))?
            {
                registry = registry.with_display_name(&name, display);
            }
        }
        Ok(registry)
    }
}

fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        message: format!("'{raw}' is not a valid URL: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            key: key.to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// The `peers` configuration section.
///
/// ```yaml
/// peers:
///   timeout_ms: 5000
///   retries: 2
///   backoff_ms: 100
///   services:
///     microservice2:
///       url: http://localhost:5002
///       display_name: Microservice2
/// ```
#[derive(Debug, Clone)]
pub struct PeerSettings {
    pub registry: PeerRegistry,
    pub timeout: Duration,
    /// Extra attempts after a transport failure.
    pub retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub backoff: Duration,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            registry: PeerRegistry::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl ConfigSection for PeerSettings {
    fn prefix() -> &'static str {
        "peers"
    }

    fn from_config(config: &IdfedConfig) -> Result<Self, ConfigError> {
        let timeout: Duration = config.get_or("peers.timeout_ms", DEFAULT_TIMEOUT)?;
        if timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "peers.timeout_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(Self {
            registry: PeerRegistry::from_config(config)?,
            timeout,
            retries: config.get_or("peers.retries", 0u32)?,
            backoff: config.get_or("peers.backoff_ms", DEFAULT_BACKOFF)?,
        })
    }
}
