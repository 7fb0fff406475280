//! Persistent notification queue and the dispatcher that feeds it.
//!
//! One task is one chat message (text, single photo, or album). Tasks live
//! in Redis — a ready list plus a retry set scored by ready-at time — and
//! survive worker restarts. Delivery is at-least-once.

pub mod dispatcher;
pub mod queue;
pub mod task;

pub use queue::{QueueError, TaskQueue};
pub use task::{NotificationTask, Priority};
