//! Library surface for the hub binary, split out so integration tests can
//! drive the router in-process without a bound TCP listener.

pub mod config;
pub mod connect;
pub mod crd;
pub mod manifest;
pub mod peer_chain;
pub mod peer_server;
pub mod proxy;
pub mod state;
pub mod ws_bytes;

use axum::routing::{any, get};
use axum::Router;

use crate::state::AppState;

/// Builds the public-listener router: connect, agent manifest, and proxy
/// routes, wired against `state`.
pub fn public_router(state: AppState) -> Router {
    Router::new()
        .route("/connect", get(connect::connect))
        .route("/kopilot-agent.yaml", get(manifest::agent_manifest))
        .route("/proxy/:namespace/:name/*rest", any(proxy::local_proxy))
        .route("/proxy/:namespace/:name", any(proxy::local_proxy_no_rest))
        .with_state(state)
}
