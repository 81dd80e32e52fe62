//! Adapts a yamux connection over an arbitrary duplex byte stream into the
//! [`Session`] trait the registry deals in, and the inbound-stream loop the
//! agent side serves from.
//!
//! This is the only module that speaks the multiplexer's wire format; a
//! different framed-multiplexer library can be substituted here without
//! touching the registry, connect handler, or proxy code.
//!
//! yamux's `Connection` is poll-only and takes `&mut self` for every
//! operation (`poll_next_inbound`, `poll_new_outbound`, `poll_close`) —
//! there is no cloneable `Control` handle to open streams from outside the
//! task that owns the connection. So a single background task owns the
//! `Connection` outright and drives it with `futures::future::poll_fn`;
//! everything else — opening an outbound stream, closing the session —
//! goes through a command channel to that task, the same indirection the
//! pack's own swarm-driving task uses to issue commands against state a
//! single task owns exclusively.

use async_trait::async_trait;
use futures::future::poll_fn;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use yamux::{Config, Connection, ConnectionError, Mode};

use crate::error::{RelayError, RelayResult};
use crate::session::{LogicalStream, Session};

enum Command {
    Open(oneshot::Sender<RelayResult<LogicalStream>>),
    Close(oneshot::Sender<()>),
}

/// A session backed by a yamux connection, driven on a dedicated background
/// task. Cloning the command sender (cheap) is how every other task reaches
/// the connection the driving task owns exclusively.
pub struct MuxSession {
    commands: mpsc::Sender<Command>,
}

impl MuxSession {
    /// Wraps `io` as a yamux connection in the given mode and spawns the
    /// task that drives it. `inbound` receives any streams the remote side
    /// opens (used on the agent side; the hub side passes `None` since it
    /// never expects the agent to open streams).
    pub fn spawn<T>(io: T, mode: Mode, inbound: Option<mpsc::Sender<LogicalStream>>) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection = Connection::new(io, Config::default(), mode);
        let (commands, commands_rx) = mpsc::channel(32);
        tokio::spawn(drive(connection, inbound, commands_rx));
        Self { commands }
    }
}

async fn drive<T>(
    mut connection: Connection<T>,
    inbound: Option<mpsc::Sender<LogicalStream>>,
    mut commands: mpsc::Receiver<Command>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            inbound_result = poll_fn(|cx| connection.poll_next_inbound(cx)) => {
                match inbound_result {
                    Some(Ok(stream)) => {
                        if let Some(tx) = &inbound {
                            if tx.send(Box::new(stream)).await.is_err() {
                                debug!("inbound stream receiver dropped, closing mux connection");
                                break;
                            }
                        } else {
                            debug!("dropping unexpected inbound stream");
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "mux connection closed with error");
                        break;
                    }
                    None => break,
                }
            }
            command = commands.recv() => {
                match command {
                    Some(Command::Open(reply)) => {
                        let result = poll_fn(|cx| connection.poll_new_outbound(cx))
                            .await
                            .map(|stream| Box::new(stream) as LogicalStream)
                            .map_err(connection_error_to_relay);
                        let _ = reply.send(result);
                    }
                    Some(Command::Close(reply)) => {
                        if let Err(err) = poll_fn(|cx| connection.poll_close(cx)).await {
                            debug!(error = %err, "error closing mux session (already discarding it)");
                        }
                        let _ = reply.send(());
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

#[async_trait]
impl Session for MuxSession {
    async fn open_stream(&self) -> RelayResult<LogicalStream> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Open(reply))
            .await
            .map_err(|_| RelayError::UpstreamFailed("mux connection closed".into()))?;
        rx.await
            .map_err(|_| RelayError::UpstreamFailed("mux connection closed".into()))?
    }

    async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Close(reply)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

fn connection_error_to_relay(err: ConnectionError) -> RelayError {
    RelayError::MuxFailed(err)
}
