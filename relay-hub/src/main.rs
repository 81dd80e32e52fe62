use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use relay_core::peer::KubeEndpointsPeerDirectory;
use relay_core::token::KubeClusterStore;
use relay_core::PeerDirectory;
use relay_hub::config::HubConfig;
use relay_hub::crd::Cluster;
use relay_hub::state::AppState;
use relay_hub::{peer_server, public_router};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HubConfig::parse();
    let kube_client = kube::Client::try_default().await?;

    let token_mapper = Arc::new(relay_core::token::KubeTokenMapper::<Cluster>::new(
        kube_client.clone(),
    ));
    let cluster_store = Arc::new(KubeClusterStore::<Cluster>::new(kube_client.clone()));

    let (peer_directory, peer_client) = if config.peer_mesh_enabled() {
        let namespace = config
            .service_namespace
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--service-namespace required when peer mesh is enabled"))?;
        let service_name = config
            .service_name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--service-name required when peer mesh is enabled"))?;
        let directory: Arc<dyn PeerDirectory> = Arc::new(KubeEndpointsPeerDirectory::new(
            kube_client.clone(),
            namespace,
            service_name,
            config.ip.clone(),
        ));
        let cert_dir = config.peer_cert_dir.clone().expect("checked by peer_mesh_enabled");
        let client = Arc::new(build_peer_client(&cert_dir, config.peer_verify_server_cert)?);
        (Some(directory), Some(client))
    } else {
        (None, None)
    };

    let state = AppState::new(config.clone(), token_mapper, cluster_store, peer_directory, peer_client);

    let public_app = public_router(state.clone());

    let public_bind: std::net::SocketAddr = config.bind.parse()?;
    info!(addr = %public_bind, "public listener starting");
    let public_listener = tokio::net::TcpListener::bind(public_bind).await?;
    let public_server = axum::serve(public_listener, public_app.into_make_service());

    if let (Some(peer_bind), Some(cert_dir)) = (config.peer_bind.clone(), config.peer_cert_dir.clone()) {
        let peer_bind: std::net::SocketAddr = peer_bind.parse()?;
        info!(addr = %peer_bind, "peer listener starting");
        let peer_state = state.clone();
        tokio::select! {
            result = public_server => { result?; }
            result = peer_server::serve(peer_state, peer_bind, &cert_dir) => { result?; }
            _ = shutdown_signal() => { info!("shutting down"); }
        }
    } else {
        tokio::select! {
            result = public_server => { result?; }
            _ = shutdown_signal() => { info!("shutting down"); }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn build_peer_client(cert_dir: &str, verify_server_cert: bool) -> anyhow::Result<reqwest::Client> {
    let identity_pem = std::fs::read(format!("{cert_dir}/tls.crt"))?;
    let mut key_pem = std::fs::read(format!("{cert_dir}/tls.key"))?;
    let mut full_chain = identity_pem.clone();
    full_chain.append(&mut key_pem);
    let identity = reqwest::Identity::from_pem(&full_chain)?;

    let mut builder = reqwest::Client::builder().identity(identity);
    if !verify_server_cert {
        builder = builder.danger_accept_invalid_certs(true);
    } else {
        let ca_pem = std::fs::read(format!("{cert_dir}/ca.crt"))?;
        let ca_cert = reqwest::Certificate::from_pem(&ca_pem)?;
        builder = builder.add_root_certificate(ca_cert);
    }
    Ok(builder.build()?)
}
