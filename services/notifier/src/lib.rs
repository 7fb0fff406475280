//! Queue worker: drains the notification queue into the Telegram Bot API
//! under the global rate limit, with per-lane retry budgets.

pub mod outcome;
pub mod worker;
