//! Cluster identity and the admission defaulting/validation functions.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};

/// A cluster's stable identity: its namespace and name as recorded externally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Renders the id used everywhere in the registry and proxy routes:
    /// `"{namespace}_{name}"`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }
}

/// The subset of a cluster record the core cares about: its identity and the
/// bearer token an agent must present to claim it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub key: ClusterKey,
    pub token: String,
}

impl ClusterRecord {
    pub fn id(&self) -> String {
        self.key.id()
    }
}

/// Fills an empty `token` with a fresh random value. A no-op on a record
/// that already has one, so calling it repeatedly is safe.
pub fn default_cluster_token(token: &mut String) {
    if token.is_empty() {
        *token = Uuid::new_v4().to_string();
    }
}

/// Rejects a record whose token is still empty. Meant to run standalone,
/// after defaulting has had a chance to run (or for records created by a
/// path that skips defaulting entirely).
pub fn validate_cluster_token(token: &str) -> Result<(), String> {
    if token.is_empty() {
        return Err("token must not be empty".to_string());
    }
    Ok(())
}

/// Looks up a cluster record by its namespace/name, used by the local proxy
/// handler to tell "no such cluster" (404) apart from "no session for it"
/// (502). A separate trait from [`crate::token::ClusterTokenMapper`]
/// because the two lookups key on different fields.
#[async_trait]
pub trait ClusterRecordStore: Send + Sync {
    async fn get(&self, key: &ClusterKey) -> RelayResult<Option<ClusterRecord>>;
}

/// A fixed in-memory record table, for tests and non-Kubernetes deployments.
#[derive(Default)]
pub struct InMemoryClusterStore {
    records: RwLock<HashMap<ClusterKey, ClusterRecord>>,
}

impl InMemoryClusterStore {
    pub fn new(records: Vec<ClusterRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.key.clone(), r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl ClusterRecordStore for InMemoryClusterStore {
    async fn get(&self, key: &ClusterKey) -> RelayResult<Option<ClusterRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|_| RelayError::Backend("cluster store lock poisoned".into()))?
            .get(key)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_finds_existing_record() {
        let key = ClusterKey::new("default", "alpha");
        let store = InMemoryClusterStore::new(vec![ClusterRecord {
            key: key.clone(),
            token: "t1".into(),
        }]);
        assert!(store.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn in_memory_store_reports_missing_record_as_none_not_error() {
        let store = InMemoryClusterStore::default();
        let key = ClusterKey::new("default", "missing");
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[test]
    fn id_formats_namespace_and_name() {
        let key = ClusterKey::new("default", "alpha");
        assert_eq!(key.id(), "default_alpha");
    }

    #[test]
    fn default_token_fills_empty() {
        let mut token = String::new();
        default_cluster_token(&mut token);
        assert!(!token.is_empty());
        assert!(Uuid::parse_str(&token).is_ok());
    }

    #[test]
    fn default_token_is_idempotent_on_non_empty() {
        let mut token = "already-set".to_string();
        default_cluster_token(&mut token);
        assert_eq!(token, "already-set");
    }

    #[test]
    fn default_token_twice_does_not_change_generated_value() {
        let mut token = String::new();
        default_cluster_token(&mut token);
        let first = token.clone();
        default_cluster_token(&mut token);
        assert_eq!(token, first);
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(validate_cluster_token("").is_err());
        assert!(validate_cluster_token("x").is_ok());
    }
}
