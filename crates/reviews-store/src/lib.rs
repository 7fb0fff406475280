//! Durable review store on Postgres.
//!
//! The single source of truth for branches, reviews, parse reports and the
//! Telegram subscriber state. The `review_id` uniqueness invariant is
//! enforced here (`ON CONFLICT DO NOTHING` on insert); every other
//! component treats a duplicate insert as a no-op success.

pub mod db;
pub mod repo;

pub use db::{create_pool, run_migrations};
