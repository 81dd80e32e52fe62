//! Resolves an agent's bearer token to a cluster id.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;

use crate::cluster::ClusterRecord;
use crate::error::{RelayError, RelayResult};

/// Maps an opaque bearer token to a cluster id.
///
/// An unknown token resolves to an empty id with `Ok(())` rather than an
/// error: that is the authentication-failure signal, distinct from a
/// transport or backend failure.
#[async_trait]
pub trait ClusterTokenMapper: Send + Sync {
    async fn map_token(&self, token: &str) -> RelayResult<String>;
}

/// A fixed in-memory token table, for tests and non-Kubernetes deployments.
#[derive(Default)]
pub struct InMemoryTokenMapper {
    records: RwLock<HashMap<String, ClusterRecord>>,
}

impl InMemoryTokenMapper {
    pub fn new(records: Vec<ClusterRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.token.clone(), r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn insert(&self, record: ClusterRecord) {
        self.records
            .write()
            .expect("token mapper lock poisoned")
            .insert(record.token.clone(), record);
    }
}

#[async_trait]
impl ClusterTokenMapper for InMemoryTokenMapper {
    async fn map_token(&self, token: &str) -> RelayResult<String> {
        let records = self.records.read().expect("token mapper lock poisoned");
        Ok(records.get(token).map(|r| r.id()).unwrap_or_default())
    }
}

/// A cluster custom resource read cluster-wide to resolve tokens. The exact
/// CRD shape is left generic: callers supply a resource type implementing
/// `HasClusterToken` so this crate does not need to own the CRD schema.
pub trait HasClusterToken {
    fn namespace(&self) -> &str;
    fn name(&self) -> &str;
    fn token(&self) -> &str;
}

/// Reads cluster custom resources across the whole cluster and matches by
/// token, mirroring the repository-backed mapper the hub is built around.
pub struct KubeTokenMapper<K> {
    client: Client,
    _marker: std::marker::PhantomData<K>,
}

impl<K> KubeTokenMapper<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<K> ClusterTokenMapper for KubeTokenMapper<K>
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug
        + HasClusterToken
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    async fn map_token(&self, token: &str) -> RelayResult<String> {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| RelayError::Backend(e.to_string()))?;
        for item in list.items {
            if item.token() == token {
                return Ok(format!("{}_{}", item.namespace(), item.name()));
            }
        }
        Ok(String::new())
    }
}

/// Reads a single cluster custom resource by namespace/name, the
/// Kubernetes-backed counterpart to [`crate::cluster::ClusterRecordStore`].
pub struct KubeClusterStore<K> {
    client: Client,
    _marker: std::marker::PhantomData<K>,
}

impl<K> KubeClusterStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<K> crate::cluster::ClusterRecordStore for KubeClusterStore<K>
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug
        + HasClusterToken
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    async fn get(
        &self,
        key: &crate::cluster::ClusterKey,
    ) -> RelayResult<Option<ClusterRecord>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        match api.get_opt(&key.name).await {
            Ok(Some(item)) => Ok(Some(ClusterRecord {
                key: key.clone(),
                token: item.token().to_string(),
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(RelayError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterKey;

    fn record(ns: &str, name: &str, token: &str) -> ClusterRecord {
        ClusterRecord {
            key: ClusterKey::new(ns, name),
            token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn known_token_maps_to_id() {
        let mapper = InMemoryTokenMapper::new(vec![record("default", "alpha", "t1")]);
        assert_eq!(mapper.map_token("t1").await.unwrap(), "default_alpha");
    }

    #[tokio::test]
    async fn unknown_token_maps_to_empty_id_without_error() {
        let mapper = InMemoryTokenMapper::new(vec![record("default", "alpha", "t1")]);
        assert_eq!(mapper.map_token("bogus").await.unwrap(), "");
    }

    #[tokio::test]
    async fn inserted_record_is_visible_immediately() {
        let mapper = InMemoryTokenMapper::default();
        mapper.insert(record("ns", "beta", "t2"));
        assert_eq!(mapper.map_token("t2").await.unwrap(), "ns_beta");
    }
}
