//! `/proxy/<ns>/<name>/<rest>`: dials into the cluster's tunnel session and
//! reverse-proxies the request over it, falling back to sibling hub
//! replicas when this replica has no session.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use relay_core::cluster::ClusterKey;
use relay_core::LogicalStream;
use tracing::warn;

use crate::state::AppState;

pub async fn local_proxy(
    State(state): State<AppState>,
    Path((namespace, name, rest)): Path<(String, String, String)>,
    req: Request<Body>,
) -> Response {
    proxy_request(&state, &namespace, &name, &rest, req, true).await
}

pub async fn local_proxy_no_rest(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    req: Request<Body>,
) -> Response {
    proxy_request(&state, &namespace, &name, "", req, true).await
}

/// Entry point for the peer listener: identical to the public proxy
/// handler but with failover disabled, so a request that is itself a
/// failover hop cannot start another failover chain.
pub async fn proxy_request_no_failover(
    state: &AppState,
    namespace: &str,
    name: &str,
    rest: &str,
    req: Request<Body>,
) -> Response {
    proxy_request(state, namespace, name, rest, req, false).await
}

/// Shared entry point for both the public listener (which may fail over to
/// peers) and the peer listener (which must not: `allow_failover = false`
/// there prevents a forwarded request from starting a second failover
/// chain and looping between replicas).
async fn proxy_request(
    state: &AppState,
    namespace: &str,
    name: &str,
    rest: &str,
    req: Request<Body>,
    allow_failover: bool,
) -> Response {
    let key = ClusterKey::new(namespace, name);

    match state.cluster_store.get(&key).await {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!(error = %err, "cluster record lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let id = key.id();
    let (parts, body) = rewrite_path(req, rest).into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(error = %err, "failed to buffer request body for proxying");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let dial_result = state.registry.dial(&id).await;
    match dial_result {
        Ok(stream) => {
            let req = Request::from_parts(parts, Body::from(bytes));
            match send_over_stream(stream, req).await {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(cluster_id = %id, error = %err, "proxied request failed after dial");
                    StatusCode::BAD_GATEWAY.into_response()
                }
            }
        }
        Err(_) if allow_failover && state.peer_directory.is_some() => {
            crate::peer_chain::forward_to_peers(state, namespace, name, rest, &parts, &bytes).await
        }
        Err(_) => StatusCode::BAD_GATEWAY.into_response(),
    }
}

fn rewrite_path(mut req: Request<Body>, rest: &str) -> Request<Body> {
    let new_path = if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{rest}")
    };
    let query = req.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let new_uri: axum::http::Uri = format!("{new_path}{query}").parse().expect("rewritten path is a valid URI");
    *req.uri_mut() = new_uri;
    req
}

/// Speaks a single HTTP/1.1 exchange over a freshly dialed logical stream.
/// One stream, one request: there is no connection pooling across dials.
pub async fn send_over_stream(
    stream: LogicalStream,
    req: Request<Body>,
) -> Result<Response, relay_core::RelayError> {
    let io = TokioIo::new(stream);
    let (mut sender, conn) = http1::handshake(io)
        .await
        .map_err(|e| relay_core::RelayError::UpstreamFailed(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "proxied connection closed");
        }
    });

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| relay_core::RelayError::UpstreamFailed(e.to_string()))?;

    let (parts, body) = resp.into_parts();
    let body = Body::new(body.map_err(axum::Error::new));
    Ok(Response::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_path_maps_empty_rest_to_root() {
        let req = Request::builder().uri("/proxy/default/alpha").body(Body::empty()).unwrap();
        let rewritten = rewrite_path(req, "");
        assert_eq!(rewritten.uri().path(), "/");
    }

    #[test]
    fn rewrite_path_strips_prefix_and_keeps_rest() {
        let req = Request::builder()
            .uri("/proxy/default/alpha/api/v1/pods?watch=1")
            .body(Body::empty())
            .unwrap();
        let rewritten = rewrite_path(req, "api/v1/pods");
        assert_eq!(rewritten.uri().path(), "/api/v1/pods");
        assert_eq!(rewritten.uri().query(), Some("watch=1"));
    }
}
