//! Maps a cluster id to its live tunnel sessions and serves dials against
//! them, evicting sessions as soon as they prove dead.

use std::sync::Arc;

use rand::Rng;
use scc::hash_map::Entry;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};
use crate::session::{LogicalStream, Session};

type SessionList = Arc<Mutex<Vec<Arc<dyn Session>>>>;

/// Cluster id → live sessions. Each cluster id gets its own lock (held for
/// the duration of a dial, including the `open_stream` call) so that dials
/// against different clusters never contend with each other.
#[derive(Default)]
pub struct ClusterSessionRegistry {
    sessions: scc::HashMap<String, SessionList, ahash::RandomState>,
}

impl ClusterSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly connected session for `cluster_id`. Never fails;
    /// duplicate sessions for the same id are expected (multiple agent
    /// replicas for one cluster).
    pub async fn add(&self, cluster_id: &str, session: Arc<dyn Session>) {
        let list = self.list_for(cluster_id).await;
        list.lock().await.push(session);
        debug!(cluster_id, "registered new session");
    }

    /// Returns the number of sessions currently held for `cluster_id`.
    /// Used by tests and diagnostics; not on the hot path.
    pub async fn session_count(&self, cluster_id: &str) -> usize {
        match self.sessions.get_async(cluster_id).await {
            Some(entry) => entry.lock().await.len(),
            None => 0,
        }
    }

    /// Opens a fresh logical stream to `cluster_id`, picking uniformly at
    /// random among its live sessions and evicting any that fail to open a
    /// stream before trying the next. Fails with [`RelayError::NoSession`]
    /// once the list is empty, whether it started that way or emptied out
    /// during this call.
    pub async fn dial(&self, cluster_id: &str) -> RelayResult<LogicalStream> {
        let list = match self.sessions.get_async(cluster_id).await {
            Some(entry) => entry.get().clone(),
            None => return Err(RelayError::NoSession(cluster_id.to_string())),
        };

        let mut sessions = list.lock().await;
        loop {
            if sessions.is_empty() {
                return Err(RelayError::NoSession(cluster_id.to_string()));
            }
            let idx = rand::thread_rng().gen_range(0..sessions.len());
            match sessions[idx].open_stream().await {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    warn!(cluster_id, error = %err, "session failed to open stream, evicting");
                    let dead = sessions.remove(idx);
                    dead.close().await;
                }
            }
        }
    }

    async fn list_for(&self, cluster_id: &str) -> SessionList {
        if let Some(entry) = self.sessions.get_async(cluster_id).await {
            return entry.get().clone();
        }
        match self.sessions.entry_async(cluster_id.to_string()).await {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let list: SessionList = Arc::new(Mutex::new(Vec::new()));
                entry.insert_entry(list.clone());
                list
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct GoodSession;

    #[async_trait]
    impl Session for GoodSession {
        async fn open_stream(&self) -> RelayResult<LogicalStream> {
            // either half of an in-memory duplex pair is a fine stand-in
            // for a real logical stream in these tests.
            let (a, _b) = tokio::io::duplex(64);
            Ok(Box::new(a))
        }
        async fn close(&self) {}
    }

    struct FailingSession {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Session for FailingSession {
        async fn open_stream(&self) -> RelayResult<LogicalStream> {
            Err(RelayError::UpstreamFailed("stream refused".into()))
        }
        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn add_is_monotonic() {
        let registry = ClusterSessionRegistry::new();
        for _ in 0..3 {
            registry.add("default_alpha", Arc::new(GoodSession)).await;
        }
        assert_eq!(registry.session_count("default_alpha").await, 3);
    }

    #[tokio::test]
    async fn dial_on_empty_fails() {
        let registry = ClusterSessionRegistry::new();
        let err = registry.dial("no_such_cluster").await.unwrap_err();
        assert!(matches!(err, RelayError::NoSession(_)));
    }

    // mirrors the {sessionCount, failedSessionCount} table this registry's
    // dial/eviction algorithm is grounded on, dialing 10 times per case.
    #[tokio::test]
    async fn dial_eviction_matrix() {
        for (good, bad) in [
            (0, 0),
            (0, 1),
            (1, 0),
            (1, 1),
            (2, 0),
            (2, 1),
            (2, 2),
        ] {
            let registry = ClusterSessionRegistry::new();
            let closes = Arc::new(AtomicUsize::new(0));
            for _ in 0..good {
                registry.add("id", Arc::new(GoodSession)).await;
            }
            for _ in 0..bad {
                registry
                    .add(
                        "id",
                        Arc::new(FailingSession {
                            closes: closes.clone(),
                        }),
                    )
                    .await;
            }

            for _ in 0..10 {
                let result = registry.dial("id").await;
                if good > 0 {
                    assert!(result.is_ok(), "case good={good} bad={bad}");
                } else {
                    assert!(result.is_err(), "case good={good} bad={bad}");
                }
            }

            if good == 0 {
                // every failing session must have been evicted and closed
                // exactly once across the 10 dial attempts.
                assert_eq!(closes.load(Ordering::SeqCst), bad);
                assert_eq!(registry.session_count("id").await, 0);
            } else {
                assert_eq!(registry.session_count("id").await, good);
            }
        }
    }
}
