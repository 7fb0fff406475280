//! Best-effort Redis cache for the hot read paths.
//!
//! Cache failures never propagate: a miss is returned instead, and the
//! error is logged. A manager built without a Redis URL is permanently
//! disabled and every operation is a no-op, so readers degrade to direct
//! store queries.

pub mod keys;

use std::collections::BTreeMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

/// Default TTLs per keyspace prefix, in seconds.
pub mod ttl {
    use std::time::Duration;

    pub const REVIEWS_PAGE: Duration = Duration::from_secs(30 * 60);
    pub const BRANCH_STATS: Duration = Duration::from_secs(60 * 60);
    pub const GENERAL_STATS: Duration = Duration::from_secs(30 * 60);
    pub const RECENT_REVIEWS: Duration = Duration::from_secs(15 * 60);
    pub const BRANCHES_LIST: Duration = Duration::from_secs(2 * 60 * 60);
}

#[derive(Clone)]
pub struct CacheManager {
    conn: Option<ConnectionManager>,
}

impl CacheManager {
    /// Connect to Redis; on any failure the manager comes up disabled.
    pub async fn connect(redis_url: &str) -> Self {
        let client = match redis::Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "invalid Redis URL, cache disabled");
                return Self::disabled();
            }
        };
        match client.get_connection_manager().await {
            Ok(conn) => {
                info!("cache connected");
                Self { conn: Some(conn) }
            }
            Err(err) => {
                warn!(error = %err, "Redis unreachable, cache disabled");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { conn: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// PING round-trip; used by the health endpoint.
    pub async fn is_available(&self) -> bool {
        let Some(conn) = self.conn.clone() else {
            return false;
        };
        let mut conn = conn;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "cache read failed");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "cache value not serializable");
                return false;
            }
        };
        match conn.set_ex::<_, _, ()>(key, raw, ttl.as_secs()).await {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "cache write failed");
                false
            }
        }
    }

    /// Delete every key matching a glob pattern. Returns how many went.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let Some(mut conn) = self.conn.clone() else {
            return 0;
        };
        let keys = match scan_keys(&mut conn, pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(pattern, error = %err, "cache scan failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        match conn.del::<_, u64>(keys).await {
            Ok(n) => n,
            Err(err) => {
                warn!(pattern, error = %err, "cache delete failed");
                0
            }
        }
    }

    /// Drop everything that may mention one branch, plus the aggregates
    /// it contributes to.
    pub async fn invalidate_branch(&self, branch_id: &str) {
        let patterns = [
            format!("reviews:{branch_id}:*"),
            format!("branch_stats:{branch_id}"),
            keys::GENERAL_STATS.to_owned(),
            "recent_reviews:*".to_owned(),
        ];
        let mut total = 0;
        for pattern in &patterns {
            total += self.delete_pattern(pattern).await;
        }
        info!(branch_id, deleted = total, "branch cache invalidated");
    }

    pub async fn invalidate_all(&self) {
        let patterns = [
            "reviews:*",
            "branch_stats:*",
            keys::GENERAL_STATS,
            "recent_reviews:*",
            keys::BRANCHES_LIST,
        ];
        let mut total = 0;
        for pattern in patterns {
            total += self.delete_pattern(pattern).await;
        }
        info!(deleted = total, "cache cleared");
    }

    /// Memory usage and key counts per prefix, for the operator endpoint.
    pub async fn stats(&self) -> serde_json::Value {
        let Some(mut conn) = self.conn.clone() else {
            return serde_json::json!({"error": "cache disabled"});
        };
        let memory: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .unwrap_or_default();

        let prefixes = [
            ("reviews", "reviews:*"),
            ("branch_stats", "branch_stats:*"),
            ("general_stats", keys::GENERAL_STATS),
            ("recent_reviews", "recent_reviews:*"),
            ("branches_list", keys::BRANCHES_LIST),
        ];
        let mut keys_by_type = BTreeMap::new();
        for (name, pattern) in prefixes {
            let count = match scan_keys(&mut conn, pattern).await {
                Ok(keys) => keys.len(),
                Err(_) => 0,
            };
            keys_by_type.insert(name.to_owned(), count);
        }

        serde_json::json!({
            "memory_used": info_field(&memory, "used_memory_human"),
            "memory_peak": info_field(&memory, "used_memory_peak_human"),
            "keys_by_type": keys_by_type,
        })
    }

    /// Take a transient run-lock (`SET NX EX`). With the cache disabled
    /// there is nothing to lock against and the call trivially succeeds.
    pub async fn acquire_lock(&self, key: &str, ttl: Duration) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            warn!(key, "no cache backend, run-lock skipped");
            return true;
        };
        let result: Result<Option<String>, _> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await;
        match result {
            Ok(reply) => reply.is_some(),
            Err(err) => {
                warn!(key, error = %err, "run-lock acquisition failed, proceeding");
                true
            }
        }
    }

    pub async fn release_lock(&self, key: &str) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        if let Err(err) = conn.del::<_, ()>(key).await {
            warn!(key, error = %err, "run-lock release failed");
        }
    }
}

async fn scan_keys(
    conn: &mut ConnectionManager,
    pattern: &str,
) -> Result<Vec<String>, redis::RedisError> {
    let mut iter = conn.scan_match::<_, String>(pattern).await?;
    let mut keys = Vec::new();
    while let Some(key) = iter.next_item().await {
        keys.push(key);
    }
    Ok(keys)
}

fn info_field(info: &str, field: &str) -> Option<String> {
    info.lines().find_map(|line| {
        line.strip_prefix(field)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(|v| v.trim().to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_is_silent() {
        let cache = CacheManager::disabled();
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn disabled_cache_misses_and_rejects_writes() {
        let cache = CacheManager::disabled();
        assert_eq!(cache.get_json::<i64>("reviews:1:50:0").await, None);
        assert!(!cache.set_json("reviews:1:50:0", &1, ttl::REVIEWS_PAGE).await);
        assert_eq!(cache.delete_pattern("reviews:*").await, 0);
        assert!(!cache.is_available().await);
        // No backend — the lock is vacuous but never blocks a run.
        assert!(cache.acquire_lock("parse:lock", Duration::from_secs(60)).await);
    }

    #[test]
    fn info_field_extraction() {
        let info = "# Memory\r\nused_memory_human:1.04M\r\nused_memory_peak_human:2.00M\r\n";
        assert_eq!(info_field(info, "used_memory_human").as_deref(), Some("1.04M"));
        assert_eq!(info_field(info, "missing"), None);
    }
}
