//! TTL cache for routing decisions.
//!
//! Keyed by the normalized query (lowercase, trimmed). A background task
//! sweeps expired entries at the TTL interval so the map does not grow
//! without bound under unique queries.

use qf_protocol::AgentKind;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// A cached routing decision.
#[derive(Debug, Clone)]
pub struct CachedRoute {
    pub kind: AgentKind,
    pub confidence: f64,
    pub cached_at: Instant,
}

/// TTL-indexed map from normalized query to routing decision.
pub struct RoutingCache {
    entries: Arc<RwLock<HashMap<String, CachedRoute>>>,
    ttl: Duration,
    sweeper: JoinHandle<()>,
}

impl RoutingCache {
    /// Create a cache with the given TTL and start its sweeper.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(ttl: Duration) -> Self {
        let entries: Arc<RwLock<HashMap<String, CachedRoute>>> = Arc::default();

        let sweeper = {
            let entries = Arc::clone(&entries);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(ttl);
                // The first tick fires immediately; skip it.
                tick.tick().await;
                loop {
                    tick.tick().await;
                    let now = Instant::now();
                    entries
                        .write()
                        .unwrap()
                        .retain(|_, route| now.duration_since(route.cached_at) < ttl);
                }
            })
        };

        Self {
            entries,
            ttl,
            sweeper,
        }
    }

    /// Look up a fresh entry for `query`. Expired entries are misses even
    /// if the sweeper has not removed them yet.
    pub fn get(&self, query: &str) -> Option<CachedRoute> {
        let entries = self.entries.read().unwrap();
        let route = entries.get(&normalize_query(query))?;
        if route.cached_at.elapsed() < self.ttl {
            Some(route.clone())
        } else {
            None
        }
    }

    /// Store (or overwrite) the routing decision for `query`.
    pub fn set(&self, query: &str, kind: AgentKind, confidence: f64) {
        self.entries.write().unwrap().insert(
            normalize_query(query),
            CachedRoute {
                kind,
                confidence,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for RoutingCache {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

fn normalize_query(q: &str) -> String {
    q.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_within_ttl_returns_last_set_value() {
        let cache = RoutingCache::new(Duration::from_secs(60));
        cache.set("Fix the bug", AgentKind::Code, 0.8);
        cache.set("Fix the bug", AgentKind::Code, 0.9);

        let route = cache.get("fix the bug").expect("cache hit");
        assert_eq!(route.kind, AgentKind::Code);
        assert!((route.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn key_is_normalized() {
        let cache = RoutingCache::new(Duration::from_secs(60));
        cache.set("  Deploy THE service  ", AgentKind::Infra, 0.7);

        assert!(cache.get("deploy the service").is_some());
        assert!(cache.get("deploy the services").is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = RoutingCache::new(Duration::from_millis(40));
        cache.set("query", AgentKind::Data, 0.5);
        assert!(cache.get("query").is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("query").is_none());
    }

    #[tokio::test]
    async fn sweeper_removes_expired_entries() {
        let cache = RoutingCache::new(Duration::from_millis(30));
        cache.set("a", AgentKind::Code, 0.5);
        cache.set("b", AgentKind::Sec, 0.5);
        assert_eq!(cache.len(), 2);

        // Two intervals is enough for the sweep to have run.
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert_eq!(cache.len(), 0);
    }
}
