//! Configuration file support for namedex
//!
//! Config files are loaded in order (later overrides earlier):
//! 1. `~/.config/namedex/config.toml` (user defaults)
//! 2. `namedex.toml` in the working directory (local overrides)
//!
//! CLI flags override all config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Configuration options loaded from config files
///
/// # Example
///
/// ```toml
/// # ~/.config/namedex/config.toml or ./namedex.toml
/// remote_url = "https://example.com/allpackages.json"
/// refresh_interval_ms = 3600000   # one hour
/// database_path = "names.db"
/// refresh_on_start = true
/// preferred_fetch_strategy = "curl"   # curl | wget | http
/// snapshot_path = "local/allpackages.json"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed endpoint returning the JSON array of name/description records
    pub remote_url: Option<String>,
    /// Milliseconds between reconciliation cycles
    pub refresh_interval_ms: Option<u64>,
    /// Location of the SQLite index
    pub database_path: Option<PathBuf>,
    /// Run one cycle immediately on daemon start
    pub refresh_on_start: Option<bool>,
    /// Force a specific fetch mechanism instead of probing
    pub preferred_fetch_strategy: Option<String>,
    /// Where to keep the last good feed payload for offline fallback
    pub snapshot_path: Option<PathBuf>,
    /// Enable quiet mode by default
    pub quiet: Option<bool>,
    /// Enable verbose mode by default
    pub verbose: Option<bool>,
}

impl Config {
    /// Load configuration from user and local config files
    pub fn load(working_dir: &Path) -> Self {
        let user_config = dirs::config_dir()
            .map(|d| d.join("namedex/config.toml"))
            .and_then(|p| Self::load_file(&p))
            .unwrap_or_default();

        let local_config =
            Self::load_file(&working_dir.join("namedex.toml")).unwrap_or_default();

        let merged = user_config.override_with(local_config);
        tracing::debug!(
            remote_url = ?merged.remote_url,
            refresh_interval_ms = ?merged.refresh_interval_ms,
            database_path = ?merged.database_path,
            refresh_on_start = ?merged.refresh_on_start,
            preferred_fetch_strategy = ?merged.preferred_fetch_strategy,
            snapshot_path = ?merged.snapshot_path,
            "Effective config after merge"
        );
        merged
    }

    /// Load configuration from a specific file
    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return None;
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Layer another config on top (other overrides self where present)
    fn override_with(self, other: Self) -> Self {
        Config {
            remote_url: other.remote_url.or(self.remote_url),
            refresh_interval_ms: other.refresh_interval_ms.or(self.refresh_interval_ms),
            database_path: other.database_path.or(self.database_path),
            refresh_on_start: other.refresh_on_start.or(self.refresh_on_start),
            preferred_fetch_strategy: other
                .preferred_fetch_strategy
                .or(self.preferred_fetch_strategy),
            snapshot_path: other.snapshot_path.or(self.snapshot_path),
            quiet: other.quiet.or(self.quiet),
            verbose: other.verbose.or(self.verbose),
        }
    }

    // ===== Accessors with defaults =====

    /// Default feed endpoint
    pub const DEFAULT_REMOTE_URL: &'static str =
        "https://raw.githubusercontent.com/polyhack/npm-github-data/master/allpackages.json";
    /// Default refresh interval: one hour
    pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 60 * 60 * 1000;
    /// Default database location
    pub const DEFAULT_DATABASE_PATH: &'static str = "names.db";

    pub fn remote_url_or_default(&self) -> String {
        self.remote_url
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_REMOTE_URL.to_string())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(
            self.refresh_interval_ms
                .unwrap_or(Self::DEFAULT_REFRESH_INTERVAL_MS),
        )
    }

    pub fn database_path_or_default(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DATABASE_PATH))
    }

    /// Refresh-on-start defaults to true: a daemon with an empty index is
    /// useless until the first cycle anyway.
    pub fn refresh_on_start_or_default(&self) -> bool {
        self.refresh_on_start.unwrap_or(true)
    }

    pub fn quiet_or_default(&self) -> bool {
        self.quiet.unwrap_or(false)
    }

    pub fn verbose_or_default(&self) -> bool {
        self.verbose.unwrap_or(false)
    }
}
