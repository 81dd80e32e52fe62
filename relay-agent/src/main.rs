mod config;
mod proxy;
mod tls;
mod ws_bytes;

use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use relay_core::mux::MuxSession;
use tokio::sync::mpsc;
use tokio_tungstenite::Connector;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yamux::Mode;

use crate::config::AgentConfig;
use crate::proxy::ApiserverClient;
use crate::ws_bytes::WsByteStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::parse();
    let auth_mode = config.auth_mode()?;

    let client = Arc::new(ApiserverClient::build(auth_mode, &config).await?);

    info!(url = %config.connect, "dialing hub");
    let connector = Connector::Rustls(tls::client_config(config.insecure_skip_verify));
    let (ws_stream, _response) =
        tokio_tungstenite::connect_async_tls_with_config(&config.connect, None, false, Some(connector))
            .await?;

    let byte_stream = WsByteStream::new(ws_stream);
    let (inbound_tx, inbound_rx) = mpsc::channel(32);
    let _session = MuxSession::spawn(byte_stream, Mode::Client, Some(inbound_tx));

    info!("agent tunnel established, serving inbound streams");
    proxy::serve_streams(inbound_rx, client).await;
    Ok(())
}
