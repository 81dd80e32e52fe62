//! The peer listener: a second, mTLS-required HTTP server that only siblings
//! talk to. It reuses the local proxy handler with failover disabled, since
//! a request that arrived here already *is* a failover hop — serving it
//! with failover enabled would let two replicas ping-pong a request forever.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::Request;
use axum::routing::any;
use axum::{body::Body, Router};
use axum_server::tls_rustls::RustlsConfig;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::state::AppState;

pub async fn serve(state: AppState, bind: SocketAddr, cert_dir: &str) -> anyhow::Result<()> {
    let tls_config = load_server_tls_config(cert_dir)?;

    let app: Router<()> = Router::new()
        .route("/proxy/:namespace/:name/*rest", any(peer_proxy))
        .route("/proxy/:namespace/:name", any(peer_proxy_no_rest))
        .with_state(state);

    axum_server::bind_rustls(bind, RustlsConfig::from_config(Arc::new(tls_config)))
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

fn load_server_tls_config(cert_dir: &str) -> anyhow::Result<ServerConfig> {
    let cert_chain = load_certs(&format!("{cert_dir}/tls.crt"))?;
    let key = load_private_key(&format!("{cert_dir}/tls.key"))?;

    let mut ca_store = RootCertStore::empty();
    for cert in load_certs(&format!("{cert_dir}/ca.crt"))? {
        ca_store.add(cert)?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(ca_store)).build()?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)?;
    Ok(config)
}

fn load_certs(path: &str) -> anyhow::Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = File::open(path)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file)).collect::<Result<Vec<_>, _>>()?;
    Ok(certs)
}

fn load_private_key(path: &str) -> anyhow::Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let file = File::open(path)?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(file))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {path}"))?;
    Ok(key)
}

async fn peer_proxy(
    State(state): State<AppState>,
    Path((namespace, name, rest)): Path<(String, String, String)>,
    req: Request<Body>,
) -> axum::response::Response {
    crate::proxy::proxy_request_no_failover(&state, &namespace, &name, &rest, req).await
}

async fn peer_proxy_no_rest(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    req: Request<Body>,
) -> axum::response::Response {
    crate::proxy::proxy_request_no_failover(&state, &namespace, &name, "", req).await
}
