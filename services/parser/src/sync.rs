//! Registry synchronizer: reconcile the stored branch set with the
//! authoritative roster.
//!
//! New roster entries are inserted and parsed in full immediately so the
//! branch surfaces without waiting for the next scheduled tick; their
//! reviews enter with `sent_to_telegram = false` and fan out through the
//! usual dispatcher path. Branches that vanish from the roster are left
//! intact.

use reviews_cache::CacheManager;
use reviews_queue::dispatcher::dispatch_pending;
use reviews_queue::TaskQueue;
use reviews_roster::Roster;
use reviews_store::repo::{branches, reviews};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::client::UpstreamClient;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("roster unavailable: {0}")]
    Roster(#[from] reviews_roster::RosterError),
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("dispatch: {0}")]
    Dispatch(#[from] reviews_queue::dispatcher::DispatchError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    pub added: usize,
    pub updated: usize,
    pub new_reviews: u64,
}

pub async fn sync_roster(
    pool: &PgPool,
    cache: &CacheManager,
    queue: Option<&TaskQueue>,
    roster: &Roster,
    client: &UpstreamClient,
) -> Result<SyncStats, SyncError> {
    let roster_branches = roster.list_branches().await?;
    let known: std::collections::HashSet<String> = branches::list_all(pool)
        .await?
        .into_iter()
        .map(|b| b.branch_id)
        .collect();
    info!(
        roster = roster_branches.len(),
        stored = known.len(),
        "branch sync started"
    );

    let mut stats = SyncStats::default();
    for entry in roster_branches.iter() {
        if known.contains(&entry.branch_id) {
            if branches::update_display_fields(pool, entry).await? {
                stats.updated += 1;
                info!(branch = %entry.name, "branch display fields refreshed");
            }
            continue;
        }

        branches::insert_branch(pool, entry).await?;
        stats.added += 1;
        info!(branch = %entry.name, id = %entry.branch_id, "new branch, running full parse");

        // Immediate backfill; a fetch failure here is not fatal — the next
        // scheduled tick retries the branch.
        match client.fetch_all(&entry.branch_id, &entry.name).await {
            Ok(all) => {
                let inserted = reviews::insert_ignoring_duplicates(pool, &all).await?;
                stats.new_reviews += inserted;
                info!(branch = %entry.name, inserted, "initial backfill stored");
            }
            Err(err) => {
                warn!(branch = %entry.name, error = %err, "initial parse failed");
            }
        }
    }

    if stats.added > 0 || stats.updated > 0 || stats.new_reviews > 0 {
        cache.invalidate_all().await;
    }

    if stats.new_reviews > 0 {
        if let Some(queue) = queue {
            dispatch_pending(pool, cache, queue).await?;
        } else {
            warn!("backfilled reviews present but no queue broker, notifications skipped");
        }
    }

    info!(
        added = stats.added,
        updated = stats.updated,
        new_reviews = stats.new_reviews,
        "branch sync finished"
    );
    Ok(stats)
}
