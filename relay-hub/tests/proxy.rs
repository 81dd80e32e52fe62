//! Drives the local proxy handler in-process via `tower::ServiceExt::oneshot`,
//! backed by a fake session whose "agent side" is a tiny in-memory HTTP
//! server, to check path rewriting and body/status passthrough end to end.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use hyper::service::service_fn;
use relay_core::cluster::{ClusterKey, ClusterRecord};
use relay_core::token::InMemoryTokenMapper;
use relay_core::{ClusterRecordStore, LogicalStream, RelayResult, Session};
use relay_hub::config::HubConfig;
use relay_hub::state::AppState;
use tower::ServiceExt;

struct SingleClusterStore(ClusterRecord);

#[async_trait]
impl ClusterRecordStore for SingleClusterStore {
    async fn get(&self, key: &ClusterKey) -> RelayResult<Option<ClusterRecord>> {
        if *key == self.0.key {
            Ok(Some(self.0.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Hands out one end of an in-memory duplex pipe per `open_stream` call,
/// driving a tiny HTTP/1.1 server on the other end that echoes the request
/// path back as the response body.
struct EchoSession;

#[async_trait]
impl Session for EchoSession {
    async fn open_stream(&self) -> RelayResult<LogicalStream> {
        let (client_side, server_side) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let io = hyper_util::rt::TokioIo::new(server_side);
            let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                let path = req.uri().path().to_string();
                Ok::<_, std::convert::Infallible>(
                    hyper::Response::builder()
                        .status(StatusCode::OK)
                        .body(http_body_util::Full::new(bytes::Bytes::from(path)))
                        .unwrap(),
                )
            });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await;
        });
        Ok(Box::new(client_side))
    }

    async fn close(&self) {}
}

fn test_config() -> HubConfig {
    HubConfig {
        bind: "127.0.0.1:0".into(),
        public_addr: "hub.example.com".into(),
        agent_image: "example/agent:latest".into(),
        ip: "127.0.0.1".into(),
        peer_bind: None,
        peer_cert_dir: None,
        service_namespace: None,
        service_name: None,
        peer_verify_server_cert: false,
    }
}

#[tokio::test]
async fn proxied_request_reaches_the_dialed_session_with_rewritten_path() {
    let record = ClusterRecord {
        key: ClusterKey::new("default", "alpha"),
        token: "t1".into(),
    };
    let mapper = Arc::new(InMemoryTokenMapper::new(vec![record.clone()]));
    let store = Arc::new(SingleClusterStore(record));
    let state = AppState::new(test_config(), mapper, store, None, None);
    state.registry.add("default_alpha", Arc::new(EchoSession)).await;

    let app = relay_hub::public_router(state);

    let req = Request::builder()
        .uri("/proxy/default/alpha/api/v1/pods")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"/api/v1/pods");
}

#[tokio::test]
async fn unknown_cluster_is_reported_as_not_found() {
    let mapper = Arc::new(InMemoryTokenMapper::default());
    let store = Arc::new(SingleClusterStore(ClusterRecord {
        key: ClusterKey::new("default", "alpha"),
        token: "t1".into(),
    }));
    let state = AppState::new(test_config(), mapper, store, None, None);
    let app = relay_hub::public_router(state);

    let req = Request::builder()
        .uri("/proxy/default/missing/anything")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn known_cluster_with_no_session_and_no_peer_mesh_is_bad_gateway() {
    let record = ClusterRecord {
        key: ClusterKey::new("default", "alpha"),
        token: "t1".into(),
    };
    let mapper = Arc::new(InMemoryTokenMapper::new(vec![record.clone()]));
    let store = Arc::new(SingleClusterStore(record));
    let state = AppState::new(test_config(), mapper, store, None, None);
    let app = relay_hub::public_router(state);

    let req = Request::builder()
        .uri("/proxy/default/alpha/anything")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
