use std::fmt;
use std::time::Duration;

/// Why an outbound call to a peer failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// No address is configured for the peer.
    UnknownPeer,
    /// The request did not complete within the configured timeout.
    Timeout(Duration),
    /// Connection refused, DNS failure, reset, ...
    Transport(String),
    /// The peer answered with a non-2xx status.
    Status(u16),
    /// The response body could not be read.
    Body(String),
}

impl TransportErrorKind {
    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPeer => write!(f, "no address configured for this peer"),
            Self::Timeout(after) => write!(f, "request timed out after {}ms", after.as_millis()),
            Self::Transport(msg) => write!(f, "{msg}"),
            Self::Status(code) => write!(f, "peer answered with status {code}"),
            Self::Body(msg) => write!(f, "failed to read response body: {msg}"),
        }
    }
}

/// A failed peer call, already attributed to caller and peer.
///
/// Renders as `"<caller> failed to call <peer>: <description>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamTransportError {
    pub caller: String,
    pub peer: String,
    pub kind: TransportErrorKind,
}

impl fmt::Display for DownstreamTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed to call {}: {}", self.caller, self.peer, self.kind)
    }
}

impl std::error::Error for DownstreamTransportError {}
