//! The worker loop: one task in flight at a time, one send token per
//! dispatch, retries parked back into the queue.

use std::time::Duration;

use reviews_queue::{NotificationTask, TaskQueue};
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto};
use teloxide::RequestError;
use tracing::{error, info, warn};

use crate::outcome::{classify, FailureKind};

const POP_TIMEOUT: Duration = Duration::from_secs(5);
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);
const DEPTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Run forever: promote due retries, pop one task, deliver it.
pub async fn run(bot: Bot, queue: TaskQueue) {
    let mut last_depth_log = tokio::time::Instant::now();
    loop {
        if let Err(err) = queue.promote_due_retries().await {
            error!(error = %err, "retry promotion failed");
        }

        if last_depth_log.elapsed() >= DEPTH_LOG_INTERVAL {
            if let Ok(depth) = queue.depth().await {
                info!(
                    ready = depth.ready,
                    scheduled_retries = depth.scheduled_retries,
                    "queue depth"
                );
            }
            last_depth_log = tokio::time::Instant::now();
        }

        match queue.pop(POP_TIMEOUT).await {
            Ok(Some(task)) => handle_task(&bot, &queue, task).await,
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "queue pop failed, backing off");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

async fn handle_task(bot: &Bot, queue: &TaskQueue, mut task: NotificationTask) {
    if let Err(err) = queue.acquire_send_token().await {
        // No token means no broker; park the task untouched and back off.
        error!(error = %err, "rate limiter unavailable");
        let _ = queue.schedule_retry(&task, Duration::from_secs(5)).await;
        return;
    }

    let attempt_number = task.attempt + 1;
    let result = tokio::time::timeout(ATTEMPT_TIMEOUT, send_task(bot, &task)).await;
    let failure = match result {
        Ok(Ok(())) => {
            info!(chat_id = task.chat_id, attempt = attempt_number, "notification sent");
            return;
        }
        Ok(Err(err)) => classify(&err),
        Err(_elapsed) => FailureKind::Transient("attempt timed out".to_owned()),
    };

    match failure {
        FailureKind::Blocked => {
            // Terminal success with a blocked outcome; exactly one attempt.
            info!(chat_id = task.chat_id, "recipient blocked the bot, task closed");
        }
        FailureKind::RetryAfter(delay) => {
            warn!(
                chat_id = task.chat_id,
                delay_secs = delay.as_secs(),
                "platform rate limit, honoring suggested delay"
            );
            // The budget is untouched: the platform asked us to wait, the
            // attempt did not fail on its own merits.
            if let Err(err) = queue.schedule_retry(&task, delay).await {
                error!(error = %err, "failed to park rate-limited task");
            }
        }
        FailureKind::Transient(reason) => {
            task.attempt = attempt_number;
            if task.attempts_exhausted() {
                error!(
                    chat_id = task.chat_id,
                    attempts = task.attempt,
                    reason = %reason,
                    "retry budget exhausted, dropping task"
                );
                return;
            }
            let delay = task.priority.retry_delay(task.attempt);
            warn!(
                chat_id = task.chat_id,
                attempt = task.attempt,
                delay_secs = delay.as_secs(),
                reason = %reason,
                "send failed, retrying"
            );
            if let Err(err) = queue.schedule_retry(&task, delay).await {
                error!(error = %err, "failed to park task for retry");
            }
        }
    }
}

/// Deliver one task: plain text, a captioned photo, or an album with the
/// caption on the first item.
async fn send_task(bot: &Bot, task: &NotificationTask) -> Result<(), RequestError> {
    let chat = ChatId(task.chat_id);
    let photos: Vec<url::Url> = task
        .photos
        .iter()
        .filter_map(|raw| match url::Url::parse(raw) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(url = %raw, error = %err, "skipping unparseable photo url");
                None
            }
        })
        .collect();

    match photos.len() {
        0 => {
            bot.send_message(chat, task.text.clone()).await?;
        }
        1 => {
            bot.send_photo(chat, InputFile::url(photos[0].clone()))
                .caption(task.text.clone())
                .await?;
        }
        _ => {
            let media: Vec<InputMedia> = photos
                .into_iter()
                .enumerate()
                .map(|(i, photo)| {
                    let mut item = InputMediaPhoto::new(InputFile::url(photo));
                    if i == 0 {
                        item = item.caption(task.text.clone());
                    }
                    InputMedia::Photo(item)
                })
                .collect();
            bot.send_media_group(chat, media).await?;
        }
    }
    Ok(())
}
