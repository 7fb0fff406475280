//! Notification dispatcher: turns freshly stored reviews into queued
//! tasks addressed to the subscribers of each branch.
//!
//! The `sent_to_telegram` flip is claimed per review with a conditional
//! UPDATE, so a concurrent dispatcher run past the flip is a no-op.
//! Pre-flip double-enqueues are possible and tolerated (at-least-once).

use std::collections::{HashMap, HashSet};

use reviews_cache::CacheManager;
use reviews_core::format::format_review_message;
use reviews_store::repo::subscribers::SubscriptionRow;
use reviews_store::repo::{reviews, subscribers};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::queue::TaskQueue;
use crate::task::{NotificationTask, Priority};

/// Reviews handled per store round-trip; the loop drains until empty.
const BATCH_SIZE: i64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("queue: {0}")]
    Queue(#[from] crate::queue::QueueError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchStats {
    /// Reviews whose flag this run flipped.
    pub reviews: u64,
    /// Tasks enqueued (one per review × subscriber).
    pub tasks: u64,
}

/// Fan out every not-yet-notified review and flip its flag.
pub async fn dispatch_pending(
    pool: &PgPool,
    cache: &CacheManager,
    queue: &TaskQueue,
) -> Result<DispatchStats, DispatchError> {
    let mut stats = DispatchStats::default();
    let mut touched_branches: HashSet<String> = HashSet::new();

    loop {
        let batch = reviews::list_unnotified(pool, BATCH_SIZE).await?;
        if batch.is_empty() {
            break;
        }
        let batch_len = batch.len() as i64;

        let mut subscriber_memo: HashMap<String, Vec<SubscriptionRow>> = HashMap::new();
        for review in batch {
            if !subscriber_memo.contains_key(&review.branch_id) {
                let fetched = subscribers::active_for_branch(pool, &review.branch_id).await?;
                subscriber_memo.insert(review.branch_id.clone(), fetched);
            }
            let subs = &subscriber_memo[&review.branch_id];

            let message = format_review_message(&review.card(), true);
            for sub in subs {
                let Ok(chat_id) = sub.user_id.parse::<i64>() else {
                    warn!(user_id = %sub.user_id, "subscriber id is not a chat id, skipping");
                    continue;
                };
                let task = NotificationTask::new(
                    chat_id,
                    message.clone(),
                    review.photos_urls.clone(),
                    Priority::Normal,
                );
                queue.enqueue(&task).await?;
                stats.tasks += 1;
            }

            // Flip only after every subscriber of this review is enqueued;
            // commit per review so a crash mid-batch cannot re-send them.
            if reviews::claim_notified(pool, &review.review_id).await? {
                stats.reviews += 1;
                touched_branches.insert(review.branch_id.clone());
            }
        }

        if batch_len < BATCH_SIZE {
            break;
        }
    }

    for branch_id in &touched_branches {
        cache.invalidate_branch(branch_id).await;
    }

    if stats.reviews > 0 {
        info!(
            reviews = stats.reviews,
            tasks = stats.tasks,
            "notifications dispatched"
        );
    }
    Ok(stats)
}
