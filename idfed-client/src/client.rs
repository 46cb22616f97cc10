use std::time::Duration;

use idfed_core::{ConfigError, IdfedConfig};
use tracing::{debug, info, warn};

use crate::error::{DownstreamTransportError, TransportErrorKind};
use crate::registry::{PeerRegistry, PeerSettings};

/// Upper bound for a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Outcome of a peer call. Failures are values, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerResponse {
    Ok(String),
    Degraded(DownstreamTransportError),
}

impl PeerResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// The peer's body, or the degraded message.
    pub fn into_text(self) -> String {
        match self {
            Self::Ok(body) => body,
            Self::Degraded(err) => err.to_string(),
        }
    }
}

/// HTTP client for calling peer services by name.
#[derive(Clone)]
pub struct PeerClient {
    client: reqwest::Client,
    caller: String,
    settings: PeerSettings,
}

impl PeerClient {
    /// `caller` is the name this service reports in degraded messages.
    pub fn new(caller: impl Into<String>, settings: PeerSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            caller: caller.into(),
            settings,
        }
    }

    /// Read `caller.name` (required) and the `peers` section.
    pub fn from_config(config: &IdfedConfig) -> Result<Self, ConfigError> {
        let caller: String = config.get("caller.name")?;
        let settings: PeerSettings = config.section()?;
        info!(
            caller = %caller,
            peers = settings.registry.len(),
            timeout_ms = settings.timeout.as_millis() as u64,
            retries = settings.retries,
            "Peer client configured"
        );
        Ok(Self::new(caller, settings))
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.settings.registry
    }

    /// Display name for `peer`, falling back to the lookup name.
    pub fn peer_display_name(&self, peer: &str) -> String {
        self.settings
            .registry
            .resolve(peer)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| peer.to_string())
    }

    /// `GET <peer base>/<resource_path>`.
    ///
    /// Transport failures are retried up to `retries` times; a non-2xx status
    /// is returned as degraded immediately.
    pub async fn call_peer(&self, peer: &str, resource_path: &str) -> PeerResponse {
        let Some(target) = self.settings.registry.resolve(peer) else {
            warn!(caller = %self.caller, %peer, "Unknown peer");
            return self.degraded(peer.to_string(), TransportErrorKind::UnknownPeer);
        };
        let url = target.resource_url(resource_path);

        let mut attempt = 0;
        loop {
            match self.attempt(&url).await {
                Ok(body) => {
                    debug!(%url, attempt, bytes = body.len(), "Peer call succeeded");
                    return PeerResponse::Ok(body);
                }
                Err(kind) if kind.is_retryable() && attempt < self.settings.retries => {
                    let delay = backoff_delay(self.settings.backoff, attempt);
                    warn!(
                        %url,
                        attempt,
                        error = %kind,
                        delay_ms = delay.as_millis() as u64,
                        "Peer call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(kind) => {
                    warn!(%url, attempt, error = %kind, "Peer call degraded");
                    return self.degraded(target.display_name.clone(), kind);
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<String, TransportErrorKind> {
        let resp = self
            .client
            .get(url)
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportErrorKind::Status(status.as_u16()));
        }

        resp.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportErrorKind::Timeout(self.settings.timeout)
            } else {
                TransportErrorKind::Body(e.to_string())
            }
        })
    }

    fn classify(&self, err: reqwest::Error) -> TransportErrorKind {
        if err.is_timeout() {
            TransportErrorKind::Timeout(self.settings.timeout)
        } else {
            TransportErrorKind::Transport(err.to_string())
        }
    }

    fn degraded(&self, peer: String, kind: TransportErrorKind) -> PeerResponse {
        PeerResponse::Degraded(DownstreamTransportError {
            caller: self.caller.clone(),
            peer,
            kind,
        })
    }
}

/// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt))
        .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, 40), MAX_BACKOFF);
    }

    #[test]
    fn into_text_renders_degraded_message() {
        let resp = PeerResponse::Degraded(DownstreamTransportError {
            caller: "a".into(),
            peer: "b".into(),
            kind: TransportErrorKind::UnknownPeer,
        });
        assert!(!resp.is_ok());
        assert_eq!(resp.into_text(), "a failed to call b: no address configured for this peer");
    }

    #[test]
    fn unknown_peer_display_name_falls_back() {
        let client = PeerClient::new("me", PeerSettings::default());
        assert_eq!(client.peer_display_name("ghost"), "ghost");
    }
}
