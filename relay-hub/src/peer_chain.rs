//! Component G: when this replica has no session for a cluster, walk its
//! sibling replicas in order until one serves the request or all are
//! exhausted.

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::state::AppState;

enum PeerAttemptError {
    /// The peer itself answered with its own "no session" 502 — it already
    /// ran its own failover chain and gave up. Stop here rather than asking
    /// the next peer the same question.
    NoSessionSentinel,
    /// A transport-level failure reaching this peer (refused connection,
    /// TLS handshake failure, timeout). Worth trying the next peer.
    Network(String),
}

pub async fn forward_to_peers(
    state: &AppState,
    namespace: &str,
    name: &str,
    rest: &str,
    parts: &Parts,
    body: &Bytes,
) -> Response {
    let directory = state
        .peer_directory
        .as_ref()
        .expect("forward_to_peers only called when a peer directory is configured");

    let peers = match directory.list_peers().await {
        Ok(peers) => peers,
        Err(err) => {
            warn!(error = %err, "failed to list peers");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let client = state
        .peer_client
        .as_ref()
        .expect("peer mesh enabled implies a peer client was built at startup");

    for peer in &peers {
        match decide(forward_one(client, &peer.addr(), namespace, name, rest, parts, body).await) {
            Decision::Return(resp) => return resp,
            Decision::Stop => return StatusCode::BAD_GATEWAY.into_response(),
            Decision::Continue(err) => {
                warn!(peer = %peer.addr(), error = %err, "peer unreachable, trying next");
                continue;
            }
        }
    }

    // every peer exhausted without success
    StatusCode::BAD_GATEWAY.into_response()
}

/// What a single peer attempt's outcome means for the chain: a real
/// response ends it, the no-session sentinel stops it at 502, and any other
/// error means the next peer is still worth trying.
enum Decision<T> {
    Return(T),
    Stop,
    Continue(String),
}

fn decide<T>(result: Result<T, PeerAttemptError>) -> Decision<T> {
    match result {
        Ok(value) => Decision::Return(value),
        Err(PeerAttemptError::NoSessionSentinel) => Decision::Stop,
        Err(PeerAttemptError::Network(err)) => Decision::Continue(err),
    }
}

fn is_no_session_sentinel(status: StatusCode) -> bool {
    status == StatusCode::BAD_GATEWAY
}

async fn forward_one(
    client: &reqwest::Client,
    peer_addr: &str,
    namespace: &str,
    name: &str,
    rest: &str,
    parts: &Parts,
    body: &Bytes,
) -> Result<Response, PeerAttemptError> {
    let url = format!("https://{peer_addr}/proxy/{namespace}/{name}/{rest}");

    let mut req = client.request(parts.method.clone(), &url);
    for (name, value) in parts.headers.iter() {
        req = req.header(name, value);
    }
    req = req.body(body.clone());

    let resp = req
        .send()
        .await
        .map_err(|e| PeerAttemptError::Network(e.to_string()))?;

    if is_no_session_sentinel(resp.status()) {
        return Err(PeerAttemptError::NoSessionSentinel);
    }

    // stream the peer's response body through rather than buffering it, so
    // a watch or long poll relayed through a sibling replica still passes
    // through unchanged. Once we commit to this peer's response there is no
    // buffered body left to retry with anyway, so any later error on the
    // stream just aborts it rather than falling back to the next peer.
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::Body::from_stream(resp.bytes_stream());

    let mut builder = Response::builder().status(status);
    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }
    Ok(builder.body(body).unwrap())
}
