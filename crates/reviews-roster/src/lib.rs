//! Branch registry.
//!
//! The authoritative roster lives in a remote spreadsheet; a local `;`
//! delimited CSV is the fallback when the spreadsheet is unreachable. The
//! last good result is cached for a short TTL, and a stale cache is still
//! served (with a warning) when both sources fail.

pub mod parse;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reviews_core::models::RosterBranch;
use tokio::sync::RwLock;
use tracing::{info, warn};

const DEFAULT_CSV_PATH: &str = "data/branches.csv";
const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("spreadsheet fetch failed: {0}")]
    Remote(String),
    #[error("fallback file '{path}': {message}")]
    Fallback { path: String, message: String },
    #[error("no roster source available: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct RosterConfig {
    /// Remote spreadsheet document key; when absent only the fallback file
    /// is consulted.
    pub spreadsheet_id: Option<String>,
    pub csv_fallback_path: PathBuf,
    pub cache_ttl: Duration,
}

impl RosterConfig {
    pub fn from_env() -> Self {
        Self {
            spreadsheet_id: std::env::var("ROSTER_SPREADSHEET_ID").ok(),
            csv_fallback_path: std::env::var("ROSTER_CSV_PATH")
                .map_or_else(|_| PathBuf::from(DEFAULT_CSV_PATH), PathBuf::from),
            cache_ttl: DEFAULT_TTL,
        }
    }
}

struct CachedRoster {
    branches: Arc<Vec<RosterBranch>>,
    fetched_at: Instant,
}

/// TTL-cached roster loader. Cheap to clone via `Arc` at call sites; all
/// methods take `&self`.
pub struct Roster {
    http: reqwest::Client,
    config: RosterConfig,
    cache: RwLock<Option<CachedRoster>>,
}

impl Roster {
    pub fn new(config: RosterConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            config,
            cache: RwLock::new(None),
        }
    }

    /// The current roster. Serves the cache while fresh; otherwise remote →
    /// fallback file → stale cache, failing only when all three are gone.
    pub async fn list_branches(&self) -> Result<Arc<Vec<RosterBranch>>, RosterError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.config.cache_ttl {
                    return Ok(Arc::clone(&cached.branches));
                }
            }
        }

        match self.load_fresh().await {
            Ok(branches) => {
                let branches = Arc::new(branches);
                *self.cache.write().await = Some(CachedRoster {
                    branches: Arc::clone(&branches),
                    fetched_at: Instant::now(),
                });
                Ok(branches)
            }
            Err(err) => {
                let cache = self.cache.read().await;
                if let Some(cached) = cache.as_ref() {
                    warn!(error = %err, "roster refresh failed, serving stale cache");
                    return Ok(Arc::clone(&cached.branches));
                }
                Err(err)
            }
        }
    }

    pub async fn lookup_by_branch_id(&self, branch_id: &str) -> Option<RosterBranch> {
        let branches = self.list_branches().await.ok()?;
        branches.iter().find(|b| b.branch_id == branch_id).cloned()
    }

    pub async fn lookup_by_iiko_id(&self, id_iiko: &str) -> Option<RosterBranch> {
        let branches = self.list_branches().await.ok()?;
        branches
            .iter()
            .find(|b| b.id_iiko.as_deref() == Some(id_iiko))
            .cloned()
    }

    pub async fn lookup_by_steady_id(&self, id_steady: &str) -> Option<RosterBranch> {
        let branches = self.list_branches().await.ok()?;
        branches
            .iter()
            .find(|b| b.id_steady.as_deref() == Some(id_steady))
            .cloned()
    }

    /// Drop the cache so the next call refetches.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn load_fresh(&self) -> Result<Vec<RosterBranch>, RosterError> {
        let remote_err = match self.fetch_remote().await {
            Ok(branches) => {
                info!(count = branches.len(), "roster loaded from spreadsheet");
                return Ok(branches);
            }
            Err(err) => {
                warn!(error = %err, "spreadsheet unavailable, trying fallback file");
                err
            }
        };

        match self.load_fallback() {
            Ok(branches) => {
                info!(count = branches.len(), "roster loaded from fallback file");
                Ok(branches)
            }
            Err(fallback_err) => Err(RosterError::Unavailable(format!(
                "{remote_err}; {fallback_err}"
            ))),
        }
    }

    async fn fetch_remote(&self) -> Result<Vec<RosterBranch>, RosterError> {
        let Some(id) = self.config.spreadsheet_id.as_deref() else {
            return Err(RosterError::Remote("no spreadsheet id configured".into()));
        };
        // First worksheet, exported as comma-delimited CSV.
        let url = format!("https://docs.google.com/spreadsheets/d/{id}/export?format=csv&gid=0");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RosterError::Remote(e.to_string()))?
            .error_for_status()
            .map_err(|e| RosterError::Remote(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RosterError::Remote(e.to_string()))?;
        parse::parse_roster_csv(&bytes, b',').map_err(|e| RosterError::Remote(e.to_string()))
    }

    fn load_fallback(&self) -> Result<Vec<RosterBranch>, RosterError> {
        let path = &self.config.csv_fallback_path;
        let bytes = std::fs::read(path).map_err(|e| RosterError::Fallback {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        parse::parse_roster_csv(&bytes, b';').map_err(|e| RosterError::Fallback {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with_fallback(path: PathBuf) -> RosterConfig {
        RosterConfig {
            spreadsheet_id: None,
            csv_fallback_path: path,
            cache_ttl: Duration::from_secs(300),
        }
    }

    fn write_fallback(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write csv");
        file
    }

    #[tokio::test]
    async fn falls_back_to_local_file_and_caches() {
        let file = write_fallback("Название точки;ИД 2gist;ИД steady;id_iiko\nТочка;42;;ik-9\n");
        let roster = Roster::new(config_with_fallback(file.path().to_owned()));

        let branches = roster.list_branches().await.expect("roster");
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].branch_id, "42");

        // Delete the file: the cached copy must still serve.
        drop(file);
        let cached = roster.list_branches().await.expect("cached roster");
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn stale_cache_survives_source_loss_after_invalidate_fails() {
        let file = write_fallback("Название точки;ИД 2gist\nТочка;42\n");
        let mut config = config_with_fallback(file.path().to_owned());
        config.cache_ttl = Duration::ZERO;
        let roster = Roster::new(config);

        roster.list_branches().await.expect("first load");
        drop(file);
        // TTL is zero, sources are gone — the stale copy is still returned.
        let stale = roster.list_branches().await.expect("stale roster");
        assert_eq!(stale[0].branch_id, "42");
    }

    #[tokio::test]
    async fn errors_when_no_source_ever_succeeded() {
        let roster = Roster::new(config_with_fallback(PathBuf::from("/nonexistent/roster.csv")));
        assert!(roster.list_branches().await.is_err());
    }

    #[tokio::test]
    async fn lookups_resolve_cross_system_ids() {
        let file = write_fallback(
            "Название точки;ИД 2gist;ИД steady;id_iiko\nА;1;st-1;ik-1\nБ;2;st-2;ik-2\n",
        );
        let roster = Roster::new(config_with_fallback(file.path().to_owned()));

        assert_eq!(
            roster.lookup_by_branch_id("2").await.map(|b| b.name),
            Some("Б".to_owned())
        );
        assert_eq!(
            roster.lookup_by_iiko_id("ik-1").await.map(|b| b.branch_id),
            Some("1".to_owned())
        );
        assert_eq!(
            roster.lookup_by_steady_id("st-2").await.map(|b| b.branch_id),
            Some("2".to_owned())
        );
        assert!(roster.lookup_by_iiko_id("missing").await.is_none());
    }
}
