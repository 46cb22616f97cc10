use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use idfed_client::{PeerClient, PeerResponse};
use idfed_core::{ConfigError, IdfedConfig};
use tracing::info;

pub const DEFAULT_PEER: &str = "microservice2";
pub const DEFAULT_RESOURCE: &str = "weatherforecast";

/// Which peer resource `GET /test` fetches.
#[derive(Debug, Clone)]
pub struct CallerTarget {
    pub peer: String,
    pub resource: String,
}

impl Default for CallerTarget {
    fn default() -> Self {
        Self {
            peer: DEFAULT_PEER.into(),
            resource: DEFAULT_RESOURCE.into(),
        }
    }
}

impl CallerTarget {
    /// `caller.peer` and `caller.resource`, defaulting to
    /// `microservice2` / `weatherforecast`.
    pub fn from_config(config: &IdfedConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            peer: config.get_or("caller.peer", DEFAULT_PEER.to_string())?,
            resource: config.get_or("caller.resource", DEFAULT_RESOURCE.to_string())?,
        })
    }
}

struct CallerState {
    peers: PeerClient,
    target: CallerTarget,
}

/// `GET /test`: always 200, the body says whether the peer answered.
pub fn routes(peers: PeerClient, target: CallerTarget) -> Router {
    Router::new()
        .route("/test", get(test_handler))
        .with_state(Arc::new(CallerState { peers, target }))
}

async fn test_handler(State(state): State<Arc<CallerState>>) -> String {
    let CallerTarget { peer, resource } = &state.target;
    match state.peers.call_peer(peer, resource).await {
        PeerResponse::Ok(body) => {
            info!(%peer, "Peer call succeeded");
            format!(
                "Result from {} calling {}: {body}",
                state.peers.caller(),
                state.peers.peer_display_name(peer)
            )
        }
        PeerResponse::Degraded(err) => err.to_string(),
    }
}
