//! Bundles the hub's shared collaborators the way the gateway struct this
//! is modeled on bundles its providers.

use std::sync::Arc;

use relay_core::{ClusterRecordStore, ClusterSessionRegistry, ClusterTokenMapper, PeerDirectory};

use crate::config::HubConfig;

/// Everything a request handler needs, threaded through as one `Arc`
/// clone per handler rather than kept behind a global singleton.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HubConfig>,
    pub token_mapper: Arc<dyn ClusterTokenMapper>,
    pub cluster_store: Arc<dyn ClusterRecordStore>,
    pub registry: Arc<ClusterSessionRegistry>,
    pub peer_directory: Option<Arc<dyn PeerDirectory>>,
    /// mTLS-configured client used only for sibling-to-sibling proxy calls.
    /// `None` when this replica has no peer mesh configured.
    pub peer_client: Option<Arc<reqwest::Client>>,
}

impl AppState {
    pub fn new(
        config: HubConfig,
        token_mapper: Arc<dyn ClusterTokenMapper>,
        cluster_store: Arc<dyn ClusterRecordStore>,
        peer_directory: Option<Arc<dyn PeerDirectory>>,
        peer_client: Option<Arc<reqwest::Client>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            token_mapper,
            cluster_store,
            registry: Arc::new(ClusterSessionRegistry::new()),
            peer_directory,
            peer_client,
        }
    }
}
