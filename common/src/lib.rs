/*!
common/src/lib.rs

Shared configuration types and DB helper functions for the briefing core.

This file provides:
- Config data structures (deserialized from TOML) for the fetch/enrich/brief
  pipelines and their shared collaborators
- An async loader for a TOML config file, with default/override merging
- Helpers to initialize an SQLite database and run migrations
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/core.db")
    pub path: String,
}

fn default_scheduler_interval_ms() -> u64 {
    60_000
}

fn default_stuck_threshold_min() -> i64 {
    10
}

/// Fetch pipeline tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub scheduler_interval_ms: u64,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub batch_size: usize,
    pub stuck_threshold_min: i64,
    /// Cap on extracted markdown handed from a WEB source to the enricher.
    pub web_body_max_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_ms: default_scheduler_interval_ms(),
            queue_capacity: 1000,
            worker_count: 4,
            batch_size: 100,
            stuck_threshold_min: default_stuck_threshold_min(),
            web_body_max_chars: 100_000,
        }
    }
}

/// Enrich pipeline tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub scheduler_interval_ms: u64,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub batch_size: usize,
    pub content_len_threshold_for_web_fetch: usize,
    pub stuck_threshold_min: i64,
    /// Cap on items returned by a single extractFromWeb call (O4).
    pub max_web_extraction_items: usize,
    /// Cap on items returned by a single extractFromEmail call (O4).
    pub max_email_extraction_items: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_ms: default_scheduler_interval_ms(),
            queue_capacity: 500,
            worker_count: 2,
            batch_size: 50,
            content_len_threshold_for_web_fetch: 2000,
            stuck_threshold_min: default_stuck_threshold_min(),
            max_web_extraction_items: 50,
            max_email_extraction_items: 5,
        }
    }
}

/// Brief pipeline tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefConfig {
    pub scheduler_interval_ms: u64,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub max_report_items: usize,
    pub stuck_threshold_min: i64,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_ms: default_scheduler_interval_ms(),
            queue_capacity: 100,
            worker_count: 2,
            max_report_items: 10,
            stuck_threshold_min: default_stuck_threshold_min(),
        }
    }
}

/// Stuck-item recovery sweep cadence, shared across all three pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub interval_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 300_000,
        }
    }
}

/// Outbound HTTP tuning for fetchers and the web-body fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub fetch_timeout_sec: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_sec: 30,
        }
    }
}

fn default_reddit_token_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}

fn default_reddit_max_age_hours() -> i64 {
    24
}

/// OAuth2 client-credentials config for the REDDIT source type. Absent unless
/// the administrator wants to enable that source type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_reddit_token_url")]
    pub token_url: String,
    #[serde(default = "default_reddit_max_age_hours")]
    pub max_age_hours: i64,
}

/// Remote LLM config (used if `llm.adapter = "remote"`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
}

/// LLM top-level config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    pub remote: Option<RemoteLlmConfig>,
}

/// Admin / maintenance config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub auto_migrate: Option<bool>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub brief: BriefConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub reddit: Option<RedditConfig>,
    pub llm: Option<LlmConfig>,
    pub admin: Option<AdminConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Run SQL migrations using sqlx's migration macro.
/// This expects a `migrations` directory at the workspace root. The caller
/// provides an async `SqlitePool` and the migrator is executed against it.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .context("Failed to run sqlx migrations")?;

    Ok(())
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary, ensure the DB file exists
/// (attempting to create it if missing), and return a configured `SqlitePool`. WAL journal
/// mode lets the three pipelines' worker pools read/write concurrently.
///
/// Example:
///   let pool = init_db_pool("data/core.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    // Try to create the DB file if it does not already exist. This gives a clearer error
    // earlier (filesystem permission or path issues) instead of only surfacing it via the
    // SQLite connection attempt.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::SystemTime;

    #[tokio::test]
    async fn config_from_string_and_db_pool() {
        let toml = r#"
            [database]
            path = "data/test.db"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.fetch.worker_count, 4);
        assert_eq!(cfg.enrich.batch_size, 50);
        assert_eq!(cfg.brief.max_report_items, 10);
        assert_eq!(cfg.recovery.interval_ms, 300_000);

        let now = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_millis();
        let dir = std::env::temp_dir().join(format!("core_test_{}", now));
        let _ = fs::create_dir_all(&dir);
        let db_path = dir.join("core.db");
        let db_path_str = db_path.to_string_lossy().to_string();

        let pool = init_db_pool(&db_path_str).await.expect("init pool");
        let conn = pool.acquire().await.expect("acquire conn");
        drop(conn);
    }

    #[test]
    fn defaults_match_configuration_table() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.queue_capacity, 1000);
        let enrich = EnrichConfig::default();
        assert_eq!(enrich.content_len_threshold_for_web_fetch, 2000);
        let brief = BriefConfig::default();
        assert_eq!(brief.queue_capacity, 100);
    }
}
