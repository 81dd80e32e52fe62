//! `GET /connect?token=<t>`: authenticates the dialing agent, upgrades to a
//! WebSocket, wraps it as a multiplexer server, and registers the session.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::mux::MuxSession;
use serde::Deserialize;
use tracing::{info, warn};
use yamux::Mode;

use crate::state::AppState;
use crate::ws_bytes::WsByteStream;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: String,
}

pub async fn connect(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    ws: axum::extract::WebSocketUpgrade,
) -> Response {
    let id = match state.token_mapper.map_token(&query.token).await {
        Ok(id) => id,
        Err(err) => {
            warn!(error = %err, "failed to map cluster token");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to map cluster token")
                .into_response();
        }
    };

    if id.is_empty() {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| async move {
        let byte_stream = WsByteStream::new(socket);
        // the hub never opens streams back to the agent at connect time;
        // it only dials lazily when a proxy request needs one.
        let session = Arc::new(MuxSession::spawn(byte_stream, Mode::Server, None));
        state.registry.add(&id, session).await;
        info!(cluster_id = %id, "registered new agent session");
    })
}
