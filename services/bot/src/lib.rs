//! Telegram bot: subscription management and review browsing.
//!
//! Every multi-step flow keeps its position in `telegram_user_states`
//! (keyed by user id, JSON), so a process restart is invisible to the
//! user. Stale states are pruned by a background sweep.

pub mod calendar;
pub mod callbacks;
pub mod flows;
pub mod plan;
pub mod state;
