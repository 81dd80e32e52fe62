//! The `Cluster` custom resource the hub reads to resolve tokens and look
//! up records. The admission webhook that defaults/validates it is out of
//! scope here (see [`relay_core::mutator`] for the pure functions it
//! would call); this module only needs the resource's shape to list it.

use kube::CustomResource;
use relay_core::token::HasClusterToken;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "relay.example.com",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced
)]
pub struct ClusterSpec {
    pub token: String,
}

impl HasClusterToken for Cluster {
    fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn token(&self) -> &str {
        &self.spec.token
    }
}
