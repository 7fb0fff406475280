//! Parser service configuration, env-driven.

use std::time::Duration;

use crate::client::UpstreamConfig;
use crate::scheduler::SchedulerConfig;

pub struct ParserConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub upstream: UpstreamConfig,
    pub scheduler: SchedulerConfig,
    pub parse_interval: Duration,
}

impl ParserConfig {
    /// Read configuration from the environment. Missing `DATABASE_URL` or
    /// `PARSER_API_KEY` is fatal.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let api_key = std::env::var("PARSER_API_KEY").expect("PARSER_API_KEY must be set");

        let upstream = UpstreamConfig {
            api_key,
            locale: env_or("PARSER_LOCALE", "ru_KZ"),
            page_size: 50,
            request_delay: Duration::from_secs(env_parsed("REQUEST_DELAY_SECS", 1)),
            http_timeout: Duration::from_secs(env_parsed("HTTP_TIMEOUT_SECS", 30)),
        };
        let scheduler = SchedulerConfig {
            branch_delay: Duration::from_secs(env_parsed("BRANCH_DELAY_SECS", 2)),
            ..SchedulerConfig::default()
        }
        .with_concurrency(env_parsed("PARSE_CONCURRENCY", 1) as usize);

        Self {
            database_url,
            redis_url: std::env::var("REDIS_URL").ok(),
            upstream,
            scheduler,
            parse_interval: Duration::from_secs(env_parsed("PARSE_INTERVAL_SECS", 86_400)),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_parsed(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
