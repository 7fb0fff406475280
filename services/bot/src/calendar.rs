//! Inline month-view calendar, Russian labels.

use chrono::{Datelike, NaiveDate};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::callbacks::{CalendarAction, CallbackAction};

const MONTHS: [&str; 12] = [
    "Январь",
    "Февраль",
    "Март",
    "Апрель",
    "Май",
    "Июнь",
    "Июль",
    "Август",
    "Сентябрь",
    "Октябрь",
    "Ноябрь",
    "Декабрь",
];

const DAYS: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];

/// Build the calendar keyboard for one month: navigation header, weekday
/// row, day grid (Monday-first), and a cancel row back to the main menu.
pub fn build_calendar(year: i32, month: u32) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();

    rows.push(vec![
        callback_button("<", CallbackAction::Calendar(CalendarAction::Prev { year, month })),
        callback_button(
            &format!("{} {year}", MONTHS[(month - 1) as usize]),
            CallbackAction::Calendar(CalendarAction::Ignore),
        ),
        callback_button(">", CallbackAction::Calendar(CalendarAction::Next { year, month })),
    ]);

    rows.push(
        DAYS.iter()
            .map(|d| callback_button(d, CallbackAction::Calendar(CalendarAction::Ignore)))
            .collect(),
    );

    for week in month_grid(year, month) {
        rows.push(
            week.into_iter()
                .map(|day| match day {
                    Some(day) => callback_button(
                        &day.to_string(),
                        CallbackAction::Calendar(CalendarAction::Day { year, month, day }),
                    ),
                    None => callback_button(" ", CallbackAction::Calendar(CalendarAction::Ignore)),
                })
                .collect(),
        );
    }

    rows.push(vec![callback_button("❌ Отмена", CallbackAction::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

/// Weeks of the month as Monday-first rows; `None` pads the edges.
pub fn month_grid(year: i32, month: u32) -> Vec<[Option<u32>; 7]> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start");
    let leading = first.weekday().num_days_from_monday() as usize;
    let total = days_in_month(year, month);

    let mut weeks = Vec::new();
    let mut week = [None; 7];
    let mut slot = leading;
    for day in 1..=total {
        week[slot] = Some(day);
        slot += 1;
        if slot == 7 {
            weeks.push(week);
            week = [None; 7];
            slot = 0;
        }
    }
    if slot > 0 {
        weeks.push(week);
    }
    weeks
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.expect("valid next month")
        .pred_opt()
        .expect("month has a last day")
        .day()
}

pub fn prev_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn callback_button(label: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.to_owned(), action.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 12), 31);
        assert_eq!(days_in_month(2025, 4), 30);
    }

    #[test]
    fn grid_covers_every_day_once() {
        let grid = month_grid(2025, 7); // July 2025 starts on Tuesday
        let days: Vec<u32> = grid.iter().flatten().flatten().copied().collect();
        assert_eq!(days, (1..=31).collect::<Vec<_>>());
        // Tuesday start: Monday slot of the first week is padding.
        assert_eq!(grid[0][0], None);
        assert_eq!(grid[0][1], Some(1));
    }

    #[test]
    fn month_navigation_wraps_years() {
        assert_eq!(prev_month(2025, 1), (2024, 12));
        assert_eq!(next_month(2024, 12), (2025, 1));
        assert_eq!(prev_month(2025, 6), (2025, 5));
        assert_eq!(next_month(2025, 6), (2025, 7));
    }

    #[test]
    fn keyboard_has_header_weekdays_grid_and_cancel() {
        let markup = build_calendar(2025, 7);
        let rows = &markup.inline_keyboard;
        assert_eq!(rows[0].len(), 3);
        assert_eq!(rows[1].len(), 7);
        assert_eq!(rows.last().unwrap().len(), 1);
        // July 2025 spans five calendar weeks.
        assert_eq!(rows.len(), 2 + 5 + 1);
    }
}
