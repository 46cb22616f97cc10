//! Peer-service HTTP client that degrades instead of failing.
//!
//! ```ignore
//! let peers = PeerClient::from_config(&config)?;
//! match peers.call_peer("microservice2", "weatherforecast").await {
//!     PeerResponse::Ok(body) => format!("got {body}"),
//!     PeerResponse::Degraded(err) => err.to_string(),
//! }
//! ```

pub mod client;
pub mod error;
pub mod registry;

pub use client::{backoff_delay, PeerClient, PeerResponse};
pub use error::{DownstreamTransportError, TransportErrorKind};
pub use registry::{Peer, PeerRegistry, PeerSettings};
