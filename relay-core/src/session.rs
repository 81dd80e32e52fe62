//! The logical-stream abstraction a multiplexed tunnel session opens.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::RelayResult;

/// The master trait for a logical byte stream opened over a multiplexed
/// session: ordinary async duplex I/O, boxable and sendable across tasks.
pub trait StreamRules: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamRules for T {}

/// A logical stream: one independent byte-duplex multiplexed over a single
/// underlying tunnel. Closing one does not affect its siblings.
pub type LogicalStream = Box<dyn StreamRules>;

/// A live multiplexed tunnel to one agent. Implementations wrap a yamux
/// client or server handle; `open_stream` is expected to be fast (no
/// network round-trip), since the registry holds its lock across the call.
#[async_trait]
pub trait Session: Send + Sync {
    /// Opens a fresh logical stream to the remote end.
    async fn open_stream(&self) -> RelayResult<LogicalStream>;

    /// Tears down the underlying transport and every logical stream on it.
    /// Best-effort: failures here are logged, never propagated, since the
    /// caller is already discarding this session.
    async fn close(&self);
}
