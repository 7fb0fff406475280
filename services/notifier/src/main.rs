// notifier: drains the Telegram notification queue.
//
// One process runs one worker prefetching one task at a time; scale out
// with more processes. The 30/s dispatch budget is shared across all of
// them through the broker.

use notifier::worker;
use reviews_queue::TaskQueue;
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let token = std::env::var("TELEGRAM_BOT_TOKEN").expect("TELEGRAM_BOT_TOKEN must be set");
    // The queue cannot run without its broker; refuse to start.
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");

    let queue = TaskQueue::connect(&redis_url)
        .await
        .expect("failed to connect to the queue broker");
    let bot = Bot::new(token);

    info!("notification worker started");
    tokio::select! {
        () = worker::run(bot, queue) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }
}
