//! The notification path from a stored review to a queued task: message
//! body contract and photo handling.

use chrono::TimeZone;
use chrono::Utc;
use reviews_core::format::{format_review_message, ReviewCard};
use reviews_queue::{NotificationTask, Priority};

fn card() -> ReviewCard<'static> {
    ReviewCard {
        branch_name: "Сандык Тары Аэропорт",
        user_name: "Данияр",
        rating: Some(5),
        text: "Все отлично",
        date_created: Some(Utc.with_ymd_and_hms(2025, 7, 20, 14, 5, 0).unwrap()),
        is_verified: true,
    }
}

#[test]
fn push_notification_body_matches_the_contract() {
    let body = format_review_message(&card(), true);
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(
        lines,
        vec![
            "📢 Новый отзыв для филиала Сандык Тары Аэропорт:",
            "👤 Автор: Данияр",
            "⭐ Рейтинг: ⭐⭐⭐⭐⭐ (5/5)",
            "📝 Текст: Все отлично",
            "📅 Дата: 20.07.2025 14:05",
            "✅ Подтвержденный отзыв",
        ]
    );
}

#[test]
fn browse_rendering_has_no_branch_prefix() {
    let body = format_review_message(&card(), false);
    assert!(body.starts_with("👤 Автор:"));
}

#[test]
fn oversized_photo_set_becomes_an_album_of_exactly_ten() {
    let photos: Vec<String> = (0..13).map(|i| format!("https://img.example/{i}.jpg")).collect();
    let task = NotificationTask::new(
        1001,
        format_review_message(&card(), true),
        photos,
        Priority::Normal,
    );
    assert_eq!(task.photos.len(), 10);
    // Order preserved, tail dropped.
    assert_eq!(task.photos[0], "https://img.example/0.jpg");
    assert_eq!(task.photos[9], "https://img.example/9.jpg");
}

#[test]
fn one_task_per_subscriber_shares_the_same_body() {
    let body = format_review_message(&card(), true);
    let subscribers = [111_i64, 222_i64];
    let tasks: Vec<NotificationTask> = subscribers
        .iter()
        .map(|chat| NotificationTask::new(*chat, body.clone(), vec![], Priority::Normal))
        .collect();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].text, tasks[1].text);
    assert_eq!(tasks[0].attempt, 0);
    assert!(tasks.iter().all(|t| t.priority == Priority::Normal));

    // Queue payloads must round-trip losslessly.
    for task in &tasks {
        let json = serde_json::to_string(task).unwrap();
        assert_eq!(serde_json::from_str::<NotificationTask>(&json).unwrap(), *task);
    }
}
