// parser: ingests 2GIS reviews for the branch roster on a schedule.
//
// Modes:
//   parser            run the in-process timer loop (sync + tick per interval)
//   parser --once     run a single tick and exit
//   parser --sync     reconcile the branch roster once and exit

use std::env;

use parser::client::UpstreamClient;
use parser::config::ParserConfig;
use parser::{scheduler, sync};
use reviews_cache::CacheManager;
use reviews_queue::TaskQueue;
use reviews_roster::{Roster, RosterConfig};
use reviews_store::db;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ParserConfig::from_env();
    let mode = env::args().nth(1).unwrap_or_default();

    info!("connecting to database...");
    let pool = db::create_pool(&config.database_url).await;
    db::run_migrations(&pool).await;

    let (cache, queue) = match config.redis_url.as_deref() {
        Some(url) => {
            let cache = CacheManager::connect(url).await;
            let queue = match TaskQueue::connect(url).await {
                Ok(queue) => Some(queue),
                Err(err) => {
                    warn!(error = %err, "queue broker unreachable, notifications disabled");
                    None
                }
            };
            (cache, queue)
        }
        None => {
            warn!("REDIS_URL not set: cache disabled, notifications disabled");
            (CacheManager::disabled(), None)
        }
    };

    let roster = Roster::new(RosterConfig::from_env());
    let client = UpstreamClient::new(config.upstream.clone());

    match mode.as_str() {
        "--sync" => {
            if let Err(err) =
                sync::sync_roster(&pool, &cache, queue.as_ref(), &roster, &client).await
            {
                error!(error = %err, "branch sync failed");
                std::process::exit(1);
            }
        }
        "--once" => {
            if let Err(err) = scheduler::run_tick(
                &pool,
                &cache,
                queue.as_ref(),
                &roster,
                &client,
                &config.scheduler,
            )
            .await
            {
                error!(error = %err, "parse tick failed");
                std::process::exit(1);
            }
        }
        _ => {
            info!(
                interval_secs = config.parse_interval.as_secs(),
                "parser running on a timer"
            );
            let mut ticker = tokio::time::interval(config.parse_interval);
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("received Ctrl+C, shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Roster drift is reconciled ahead of every tick so a
                        // freshly added branch is parsed in the same pass.
                        if let Err(err) =
                            sync::sync_roster(&pool, &cache, queue.as_ref(), &roster, &client).await
                        {
                            error!(error = %err, "branch sync failed");
                        }
                        if let Err(err) = scheduler::run_tick(
                            &pool,
                            &cache,
                            queue.as_ref(),
                            &roster,
                            &client,
                            &config.scheduler,
                        )
                        .await
                        {
                            error!(error = %err, "parse tick failed");
                        }
                    }
                }
            }
        }
    }
}
