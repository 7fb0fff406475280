//! Periodic incremental ingestion over the whole roster.
//!
//! One tick: snapshot the roster, walk each branch in a small worker pool,
//! diff the upstream tail against the stored `review_id` set, append the
//! new rows, write one `ParseReport`, and — when anything new landed —
//! drive the notification dispatcher.
//!
//! A Redis run-lock prevents overlapping ticks. The uniqueness invariant
//! holds without it; the lock only avoids double work.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reviews_cache::CacheManager;
use reviews_core::NewReview;
use reviews_queue::dispatcher::dispatch_pending;
use reviews_queue::TaskQueue;
use reviews_roster::Roster;
use reviews_store::repo::{reports, reviews};
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::client::UpstreamClient;

const RUN_LOCK_KEY: &str = "parse:run_lock";

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("roster unavailable: {0}")]
    Roster(#[from] reviews_roster::RosterError),
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("dispatch: {0}")]
    Dispatch(#[from] reviews_queue::dispatcher::DispatchError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Parallel branch workers; politeness keeps the default at 1.
    pub concurrency: usize,
    /// Sleep after finishing one branch before the worker takes the next.
    pub branch_delay: Duration,
    /// Run-lock TTL; must exceed the longest plausible tick.
    pub run_lock_ttl: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            branch_delay: Duration::from_secs(2),
            run_lock_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl SchedulerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, 4);
        self
    }
}

/// Outcome of one branch within one tick.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BranchOutcome {
    pub branch_id: String,
    pub branch_name: String,
    pub total_reviews: usize,
    pub new_reviews: u64,
    pub error: Option<String>,
}

impl BranchOutcome {
    fn failed(branch_id: &str, branch_name: &str, error: String) -> Self {
        Self {
            branch_id: branch_id.to_owned(),
            branch_name: branch_name.to_owned(),
            total_reviews: 0,
            new_reviews: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TickSummary {
    pub total_branches: usize,
    pub successful_branches: usize,
    pub new_reviews: u64,
}

/// Run one tick. Returns `None` when another tick holds the run-lock.
pub async fn run_tick(
    pool: &PgPool,
    cache: &CacheManager,
    queue: Option<&TaskQueue>,
    roster: &Roster,
    client: &UpstreamClient,
    config: &SchedulerConfig,
) -> Result<Option<TickSummary>, TickError> {
    if !cache.acquire_lock(RUN_LOCK_KEY, config.run_lock_ttl).await {
        warn!("previous parse tick still running, skipping");
        return Ok(None);
    }
    let result = run_tick_locked(pool, cache, queue, roster, client, config).await;
    cache.release_lock(RUN_LOCK_KEY).await;
    result.map(Some)
}

async fn run_tick_locked(
    pool: &PgPool,
    cache: &CacheManager,
    queue: Option<&TaskQueue>,
    roster: &Roster,
    client: &UpstreamClient,
    config: &SchedulerConfig,
) -> Result<TickSummary, TickError> {
    let started = Utc::now();
    let branches = roster.list_branches().await?;
    info!(branches = branches.len(), "parse tick started");

    let semaphore = Arc::new(Semaphore::new(config.concurrency.clamp(1, 4)));
    let mut join_set = tokio::task::JoinSet::new();
    for branch in branches.iter().cloned() {
        let semaphore = Arc::clone(&semaphore);
        let pool = pool.clone();
        let client = client.clone();
        let branch_delay = config.branch_delay;
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let outcome = parse_branch_incremental(&pool, &client, &branch.branch_id, &branch.name)
                .await;
            tokio::time::sleep(branch_delay).await;
            outcome
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => error!(error = %err, "branch worker panicked"),
        }
    }

    let failed: Vec<&BranchOutcome> = outcomes.iter().filter(|o| o.error.is_some()).collect();
    let new_reviews: u64 = outcomes.iter().map(|o| o.new_reviews).sum();
    let total_reviews: usize = outcomes.iter().map(|o| o.total_reviews).sum();
    let duration = (Utc::now() - started).num_milliseconds() as f64 / 1_000.0;

    let report = reports::NewParseReport {
        parse_date: started,
        total_branches: branches.len() as i32,
        successful_branches: (outcomes.len() - failed.len()) as i32,
        failed_branches: failed.len() as i32,
        total_reviews: total_reviews as i32,
        new_reviews: new_reviews as i32,
        duration_seconds: duration,
        errors: if failed.is_empty() {
            None
        } else {
            serde_json::to_string(&failed).ok()
        },
    };
    reports::insert_report(pool, &report).await?;

    info!(
        new_reviews,
        failed = failed.len(),
        duration_seconds = duration,
        "parse tick finished"
    );

    if new_reviews > 0 {
        if let Some(queue) = queue {
            dispatch_pending(pool, cache, queue).await?;
        } else {
            warn!("new reviews found but no queue broker, notifications skipped");
        }
    }

    Ok(TickSummary {
        total_branches: branches.len(),
        successful_branches: outcomes.len() - failed.len(),
        new_reviews,
    })
}

/// Parse one branch incrementally. Branch-level failures are captured in
/// the outcome and never abort the tick.
pub async fn parse_branch_incremental(
    pool: &PgPool,
    client: &UpstreamClient,
    branch_id: &str,
    branch_name: &str,
) -> BranchOutcome {
    let existing = match reviews::list_existing_review_ids(pool, branch_id).await {
        Ok(ids) => ids,
        Err(err) => {
            error!(branch = %branch_name, error = %err, "failed to read existing review ids");
            return BranchOutcome::failed(branch_id, branch_name, err.to_string());
        }
    };

    let all = match client.fetch_all(branch_id, branch_name).await {
        Ok(all) => all,
        Err(err) => {
            warn!(branch = %branch_name, error = %err, "branch fetch failed for this tick");
            return BranchOutcome::failed(branch_id, branch_name, err.to_string());
        }
    };

    let total = all.len();
    let fresh = select_new(all, &existing);
    let new_reviews = match reviews::insert_ignoring_duplicates(pool, &fresh).await {
        Ok(n) => n,
        Err(err) => {
            error!(branch = %branch_name, error = %err, "failed to insert reviews");
            return BranchOutcome::failed(branch_id, branch_name, err.to_string());
        }
    };

    if new_reviews > 0 {
        info!(branch = %branch_name, new_reviews, total, "new reviews stored");
    }
    BranchOutcome {
        branch_id: branch_id.to_owned(),
        branch_name: branch_name.to_owned(),
        total_reviews: total,
        new_reviews,
        error: None,
    }
}

/// Keep only reviews whose fingerprint is not in the stored set.
pub fn select_new(all: Vec<NewReview>, existing: &HashSet<String>) -> Vec<NewReview> {
    all.into_iter()
        .filter(|r| !existing.contains(&r.review_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: &str) -> NewReview {
        NewReview {
            review_id: id.to_owned(),
            branch_id: "b".into(),
            branch_name: "Branch".into(),
            user_name: "User".into(),
            rating: Some(5),
            text: String::new(),
            date_created: None,
            date_edited: None,
            is_verified: false,
            likes_count: 0,
            comments_count: 0,
            photos_urls: vec![],
        }
    }

    #[test]
    fn select_new_prunes_known_fingerprints() {
        let existing: HashSet<String> = ["a", "b"].iter().map(|s| (*s).to_owned()).collect();
        let fresh = select_new(vec![review("a"), review("c"), review("b")], &existing);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].review_id, "c");
    }

    #[test]
    fn select_new_with_empty_store_keeps_everything() {
        let fresh = select_new(vec![review("a"), review("b")], &HashSet::new());
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(SchedulerConfig::default().with_concurrency(0).concurrency, 1);
        assert_eq!(SchedulerConfig::default().with_concurrency(9).concurrency, 4);
    }
}
