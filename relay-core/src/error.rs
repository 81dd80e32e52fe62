//! Error types shared across the tunnel core.

/// Errors produced by the registry, token mapper, peer directory and mux adapter.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// `dial` was called for a cluster id with no live sessions, or every
    /// session failed to open a stream during the call.
    #[error("no session available for cluster {0}")]
    NoSession(String),

    /// The bearer token presented at `/connect` did not map to a cluster.
    #[error("token did not map to a known cluster")]
    TokenInvalid,

    /// The requested cluster record does not exist.
    #[error("cluster {0} not found")]
    ClusterNotFound(String),

    /// The WebSocket upgrade failed.
    #[error("websocket upgrade failed: {0}")]
    UpgradeFailed(String),

    /// Wrapping the upgraded stream as a mux session failed.
    #[error("multiplexer setup failed: {0}")]
    MuxFailed(#[from] yamux::ConnectionError),

    /// Listing sibling hub replicas failed.
    #[error("peer list unavailable: {0}")]
    PeerListFailed(String),

    /// A peer responded, but with an error status, or was unreachable.
    #[error("peer request failed: {0}")]
    UpstreamFailed(String),

    /// The upstream peer answered with its own "no session" 502. Carries no
    /// message by design: it is the internal sentinel the failover chain
    /// tests for to decide whether to stop or try the next peer.
    #[error("")]
    PeerHadNoSession,

    /// Token mapper / cluster store backend I/O error (Kubernetes API, Consul, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias used throughout `relay-core`.
pub type RelayResult<T> = Result<T, RelayError>;
