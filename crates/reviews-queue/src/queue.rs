//! Redis-backed task queue.
//!
//! Layout:
//! - `telegram_notifications` — ready list (LPUSH / BRPOP).
//! - `telegram_notifications:retry` — sorted set of serialized tasks
//!   scored by the epoch second they become due; a promotion sweep moves
//!   due members back onto the ready list.
//! - `telegram_notifications:rate:<second>` — per-second send counter
//!   implementing the global 30/s limit across all workers.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::task::NotificationTask;

pub const QUEUE_KEY: &str = "telegram_notifications";
const RETRY_KEY: &str = "telegram_notifications:retry";
const RATE_KEY_PREFIX: &str = "telegram_notifications:rate";

/// Global dispatch budget across every worker process.
pub const RATE_LIMIT_PER_SEC: u32 = 30;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("task encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueueDepth {
    pub ready: u64,
    pub scheduled_retries: u64,
}

#[derive(Clone)]
pub struct TaskQueue {
    conn: ConnectionManager,
}

impl TaskQueue {
    /// Connect to the broker. Unlike the cache this is load-bearing: a
    /// missing broker is an error the caller must treat as fatal.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub async fn enqueue(&self, task: &NotificationTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(QUEUE_KEY, payload).await?;
        Ok(())
    }

    /// Blocking pop of a single task; each worker prefetches exactly one.
    pub async fn pop(&self, timeout: Duration) -> Result<Option<NotificationTask>, QueueError> {
        let mut conn = self.conn.clone();
        let reply: Option<(String, String)> = conn
            .brpop(QUEUE_KEY, timeout.as_secs_f64())
            .await?;
        match reply {
            Some((_key, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Park a task until `delay` from now.
    pub async fn schedule_retry(
        &self,
        task: &NotificationTask,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let due_at = chrono::Utc::now().timestamp() + delay.as_secs() as i64;
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(RETRY_KEY, payload, due_at).await?;
        Ok(())
    }

    /// Move every due retry back onto the ready list. Returns the count.
    pub async fn promote_due_retries(&self) -> Result<u64, QueueError> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.conn.clone();
        let due: Vec<String> = conn.zrangebyscore(RETRY_KEY, "-inf", now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        for payload in &due {
            conn.lpush::<_, _, ()>(QUEUE_KEY, payload).await?;
            conn.zrem::<_, _, ()>(RETRY_KEY, payload).await?;
        }
        debug!(count = due.len(), "promoted due retries");
        Ok(due.len() as u64)
    }

    /// Take one send token from the global per-second budget, suspending
    /// until a second with spare budget arrives.
    pub async fn acquire_send_token(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        loop {
            let second = chrono::Utc::now().timestamp();
            let key = format!("{RATE_KEY_PREFIX}:{second}");
            let used: u32 = conn.incr(&key, 1).await?;
            // Counter keys self-expire; two seconds covers clock straddling.
            conn.expire::<_, ()>(&key, 2).await?;
            if used <= RATE_LIMIT_PER_SEC {
                return Ok(());
            }
            let elapsed_ms = u64::from(chrono::Utc::now().timestamp_subsec_millis().min(999));
            tokio::time::sleep(Duration::from_millis(1_000 - elapsed_ms)).await;
        }
    }

    pub async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let mut conn = self.conn.clone();
        let ready: u64 = conn.llen(QUEUE_KEY).await?;
        let scheduled_retries: u64 = conn.zcard(RETRY_KEY).await?;
        Ok(QueueDepth {
            ready,
            scheduled_retries,
        })
    }
}
