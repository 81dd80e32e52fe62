//! Drives the connect handshake over a real bound listener, since a
//! WebSocket upgrade needs an actual HTTP connection rather than an
//! in-process `oneshot` call.

use std::sync::Arc;

use relay_core::cluster::{ClusterKey, ClusterRecord};
use relay_core::token::InMemoryTokenMapper;
use relay_core::ClusterRecordStore;
use relay_hub::config::HubConfig;
use relay_hub::state::AppState;
use tokio_tungstenite::tungstenite::http::StatusCode;

struct EmptyClusterStore;

#[async_trait::async_trait]
impl ClusterRecordStore for EmptyClusterStore {
    async fn get(&self, _key: &ClusterKey) -> relay_core::RelayResult<Option<ClusterRecord>> {
        Ok(None)
    }
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

async fn spawn_test_server(state: AppState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = relay_hub::public_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn valid_token_upgrades_and_registers_session() {
    let mapper = Arc::new(InMemoryTokenMapper::new(vec![ClusterRecord {
        key: ClusterKey::new("default", "alpha"),
        token: "good-token".into(),
    }]));
    let state = AppState::new(test_config(), mapper, Arc::new(EmptyClusterStore), None, None);
    let registry = state.registry.clone();
    let addr = spawn_test_server(state).await;

    assert_eq!(registry.session_count("default_alpha").await, 0);

    let url = format!("ws://{addr}/connect?token=good-token");
    let (_stream, response) = tokio_tungstenite::connect_async(&url).await.unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

    // give the server-side upgrade future a moment to register the session
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(registry.session_count("default_alpha").await, 1);
}

#[tokio::test]
async fn invalid_token_is_rejected_without_registering() {
    let mapper = Arc::new(InMemoryTokenMapper::new(vec![ClusterRecord {
        key: ClusterKey::new("default", "alpha"),
        token: "good-token".into(),
    }]));
    let state = AppState::new(test_config(), mapper, Arc::new(EmptyClusterStore), None, None);
    let registry = state.registry.clone();
    let addr = spawn_test_server(state).await;

    let url = format!("ws://{addr}/connect?token=bogus");
    let err = tokio_tungstenite::connect_async(&url).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        other => panic!("expected an HTTP error, got {other:?}"),
    }
    assert_eq!(registry.session_count("default_alpha").await, 0);
}
