//! Typed callback data.
//!
//! Telegram caps callback data at 64 bytes, so buttons carry only ids;
//! display names are resolved from the session state or the store.

/// Everything an inline button can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    MainMenu,
    MenuSubscribe,
    MenuSubscriptions,
    MenuReviews,
    MenuHelp,
    ToggleBranch(String),
    SelectAll,
    UnselectAll,
    ConfirmSelection,
    ConfirmUnsubscribe,
    DoUnsubscribe,
    BrowseBranch(String),
    ShowMore,
    Calendar(CalendarAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarAction {
    Prev { year: i32, month: u32 },
    Next { year: i32, month: u32 },
    Day { year: i32, month: u32, day: u32 },
    Ignore,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            Self::MainMenu => "menu".into(),
            Self::MenuSubscribe => "menu:subscribe".into(),
            Self::MenuSubscriptions => "menu:subscriptions".into(),
            Self::MenuReviews => "menu:reviews".into(),
            Self::MenuHelp => "menu:help".into(),
            Self::ToggleBranch(id) => format!("toggle:{id}"),
            Self::SelectAll => "select:all".into(),
            Self::UnselectAll => "select:none".into(),
            Self::ConfirmSelection => "select:confirm".into(),
            Self::ConfirmUnsubscribe => "unsub:confirm".into(),
            Self::DoUnsubscribe => "unsub:do".into(),
            Self::BrowseBranch(id) => format!("browse:{id}"),
            Self::ShowMore => "browse:more".into(),
            Self::Calendar(action) => match action {
                CalendarAction::Prev { year, month } => format!("cal:prev:{year}:{month}"),
                CalendarAction::Next { year, month } => format!("cal:next:{year}:{month}"),
                CalendarAction::Day { year, month, day } => {
                    format!("cal:day:{year}:{month}:{day}")
                }
                CalendarAction::Ignore => "cal:ignore".into(),
            },
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "menu" => return Some(Self::MainMenu),
            "menu:subscribe" => return Some(Self::MenuSubscribe),
            "menu:subscriptions" => return Some(Self::MenuSubscriptions),
            "menu:reviews" => return Some(Self::MenuReviews),
            "menu:help" => return Some(Self::MenuHelp),
            "select:all" => return Some(Self::SelectAll),
            "select:none" => return Some(Self::UnselectAll),
            "select:confirm" => return Some(Self::ConfirmSelection),
            "unsub:confirm" => return Some(Self::ConfirmUnsubscribe),
            "unsub:do" => return Some(Self::DoUnsubscribe),
            "browse:more" => return Some(Self::ShowMore),
            "cal:ignore" => return Some(Self::Calendar(CalendarAction::Ignore)),
            _ => {}
        }

        if let Some(id) = data.strip_prefix("toggle:") {
            return (!id.is_empty()).then(|| Self::ToggleBranch(id.to_owned()));
        }
        if let Some(id) = data.strip_prefix("browse:") {
            return (!id.is_empty()).then(|| Self::BrowseBranch(id.to_owned()));
        }
        if let Some(rest) = data.strip_prefix("cal:") {
            return parse_calendar(rest).map(Self::Calendar);
        }
        None
    }
}

fn parse_calendar(rest: &str) -> Option<CalendarAction> {
    let mut parts = rest.split(':');
    let kind = parts.next()?;
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    match kind {
        "prev" => Some(CalendarAction::Prev { year, month }),
        "next" => Some(CalendarAction::Next { year, month }),
        "day" => {
            let day: u32 = parts.next()?.parse().ok()?;
            Some(CalendarAction::Day { year, month, day })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let actions = [
            CallbackAction::MainMenu,
            CallbackAction::MenuSubscribe,
            CallbackAction::ToggleBranch("70000001057699052".into()),
            CallbackAction::SelectAll,
            CallbackAction::ConfirmSelection,
            CallbackAction::DoUnsubscribe,
            CallbackAction::BrowseBranch("42".into()),
            CallbackAction::ShowMore,
            CallbackAction::Calendar(CalendarAction::Prev { year: 2024, month: 1 }),
            CallbackAction::Calendar(CalendarAction::Day {
                year: 2024,
                month: 12,
                day: 31,
            }),
            CallbackAction::Calendar(CalendarAction::Ignore),
        ];
        for action in actions {
            let encoded = action.encode();
            assert!(encoded.len() <= 64, "callback data too long: {encoded}");
            assert_eq!(CallbackAction::parse(&encoded), Some(action));
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("toggle:"), None);
        assert_eq!(CallbackAction::parse("cal:day:2024:13:1"), None);
        assert_eq!(CallbackAction::parse("cal:day:x:1:1"), None);
        assert_eq!(CallbackAction::parse("unexpected"), None);
    }
}
