// bot: Telegram interface for subscriptions and review browsing.

use std::sync::Arc;
use std::time::Duration;

use bot::flows::{self, BotContext, Command};
use reviews_roster::{Roster, RosterConfig};
use reviews_store::db;
use reviews_store::repo::sessions;
use sqlx::PgPool;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Session states idle longer than this are harvested.
const STATE_MAX_AGE: Duration = Duration::from_secs(60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let token = std::env::var("TELEGRAM_BOT_TOKEN").expect("TELEGRAM_BOT_TOKEN must be set");
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("connecting to database...");
    let pool = db::create_pool(&database_url).await;
    db::run_migrations(&pool).await;

    let ctx = BotContext {
        pool: pool.clone(),
        roster: Arc::new(Roster::new(RosterConfig::from_env())),
    };
    let bot = Bot::new(token);

    tokio::spawn(session_sweep(pool));

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(flows::handle_command),
        )
        .branch(Update::filter_callback_query().endpoint(flows::handle_callback))
        .branch(Update::filter_message().endpoint(flows::handle_text));

    info!("bot started");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/// Hourly harvest of stale conversational state.
async fn session_sweep(pool: PgPool) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        match sessions::delete_older_than(&pool, STATE_MAX_AGE.as_secs() as i32).await {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "stale session states removed"),
            Err(err) => error!(error = %err, "session sweep failed"),
        }
    }
}
