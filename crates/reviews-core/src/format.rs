//! Telegram message bodies for a single review.

use chrono::{DateTime, Utc};

/// The fields a review message is rendered from. Both freshly normalized
/// reviews and stored rows can produce one.
#[derive(Debug, Clone, Copy)]
pub struct ReviewCard<'a> {
    pub branch_name: &'a str,
    pub user_name: &'a str,
    pub rating: Option<i32>,
    pub text: &'a str,
    pub date_created: Option<DateTime<Utc>>,
    pub is_verified: bool,
}

/// Render the plain-text message body. `show_branch` adds the
/// "Новый отзыв" header used for push notifications; the browse flow
/// omits it.
pub fn format_review_message(card: &ReviewCard<'_>, show_branch: bool) -> String {
    let mut message = String::new();

    if show_branch {
        message.push_str(&format!(
            "📢 Новый отзыв для филиала {}:\n",
            card.branch_name
        ));
    }

    let author = if card.user_name.trim().is_empty() {
        "Аноним"
    } else {
        card.user_name
    };
    message.push_str(&format!("👤 Автор: {author}\n"));
    message.push_str(&format!(
        "⭐ Рейтинг: {} ({}/5)\n",
        rating_stars(card.rating),
        card.rating.map_or_else(|| "—".to_owned(), |r| r.to_string())
    ));

    let text = if card.text.is_empty() {
        "Без текста"
    } else {
        card.text
    };
    message.push_str(&format!("📝 Текст: {text}\n"));

    let date = card.date_created.map_or_else(
        || "Неизвестно".to_owned(),
        |d| d.format("%d.%m.%Y %H:%M").to_string(),
    );
    message.push_str(&format!("📅 Дата: {date}\n"));

    if card.is_verified {
        message.push_str("✅ Подтвержденный отзыв\n");
    }

    message
}

/// One star per rating point; unrated reviews still show a single star.
pub fn rating_stars(rating: Option<i32>) -> String {
    let count = rating.map_or(1, |r| r.clamp(1, 5) as usize);
    "⭐".repeat(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card() -> ReviewCard<'static> {
        ReviewCard {
            branch_name: "Сандык Тары Центральный",
            user_name: "Айгерим",
            rating: Some(4),
            text: "Очень вкусно!\nПридем ещё.",
            date_created: Some(Utc.with_ymd_and_hms(2025, 7, 10, 10, 30, 0).unwrap()),
            is_verified: false,
        }
    }

    #[test]
    fn notification_body_matches_contract() {
        let body = format_review_message(&card(), true);
        assert_eq!(
            body,
            "📢 Новый отзыв для филиала Сандык Тары Центральный:\n\
             👤 Автор: Айгерим\n\
             ⭐ Рейтинг: ⭐⭐⭐⭐ (4/5)\n\
             📝 Текст: Очень вкусно!\nПридем ещё.\n\
             📅 Дата: 10.07.2025 10:30\n"
        );
    }

    #[test]
    fn browse_body_omits_branch_header() {
        let body = format_review_message(&card(), false);
        assert!(!body.contains("Новый отзыв"));
        assert!(body.starts_with("👤 Автор: Айгерим\n"));
    }

    #[test]
    fn verified_line_is_appended() {
        let mut c = card();
        c.is_verified = true;
        let body = format_review_message(&c, true);
        assert!(body.ends_with("✅ Подтвержденный отзыв\n"));
    }

    #[test]
    fn fallbacks_for_empty_fields() {
        let c = ReviewCard {
            branch_name: "X",
            user_name: "",
            rating: None,
            text: "",
            date_created: None,
            is_verified: false,
        };
        let body = format_review_message(&c, false);
        assert!(body.contains("👤 Автор: Аноним\n"));
        assert!(body.contains("⭐ Рейтинг: ⭐ (—/5)\n"));
        assert!(body.contains("📝 Текст: Без текста\n"));
        assert!(body.contains("📅 Дата: Неизвестно\n"));
    }

    #[test]
    fn stars_track_rating() {
        assert_eq!(rating_stars(Some(5)), "⭐⭐⭐⭐⭐");
        assert_eq!(rating_stars(Some(1)), "⭐");
        assert_eq!(rating_stars(None), "⭐");
    }
}
