use std::sync::Arc;

use reviews_cache::CacheManager;
use reviews_roster::Roster;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: CacheManager,
    pub roster: Arc<Roster>,
}

impl AppState {
    pub fn new(pool: PgPool, cache: CacheManager, roster: Arc<Roster>) -> Self {
        Self { pool, cache, roster }
    }
}
