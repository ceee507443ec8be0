//! Configuration resolution for gitviz-import
//!
//! GitHub token priority: Database → ENV → TOML.
//! Bulk import tuning: ENV → TOML → compiled defaults.

use gitviz_common::config::TomlConfig;
use gitviz_common::Result;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the GitHub token
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Environment variable overriding the clone concurrency ceiling
pub const MAX_CONCURRENT_CLONES_ENV: &str = "GITVIZ_MAX_CONCURRENT_CLONES";

/// Default GitHub REST API base URL
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Default template for project names
pub const DEFAULT_PROJECT_NAME_TEMPLATE: &str = "{owner}";

/// Upper bound for a per-request concurrency override
pub const MAX_REQUEST_CONCURRENCY: usize = 32;

/// Per-owner repository limit when the request does not give one
pub const DEFAULT_REPO_LIMIT: usize = 10_000;

/// Absolute per-owner repository limit
pub const MAX_REPO_LIMIT: usize = 99_999;

const MIB: u64 = 1024 * 1024;

/// Resolve the GitHub token from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
///
/// Returns `None` when no source holds a usable token. Absence only matters
/// once a bulk import starts.
pub async fn resolve_github_token(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_token = crate::db::settings::get_github_token(db)
        .await?
        .filter(|t| is_valid_token(t));
    let env_token = std::env::var(GITHUB_TOKEN_ENV)
        .ok()
        .filter(|t| is_valid_token(t));
    let toml_token = toml_config
        .github_token
        .clone()
        .filter(|t| is_valid_token(t));

    let sources: Vec<&str> = [
        db_token.as_ref().map(|_| "database"),
        env_token.as_ref().map(|_| "environment"),
        toml_token.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "GitHub token found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(token) = db_token {
        info!("GitHub token loaded from database");
        return Ok(Some(token));
    }
    if let Some(token) = env_token {
        info!("GitHub token loaded from environment variable");
        return Ok(Some(token));
    }
    if let Some(token) = toml_token {
        info!("GitHub token loaded from TOML config");
        return Ok(Some(token));
    }

    Ok(None)
}

/// Validate token (non-empty, non-whitespace)
pub fn is_valid_token(token: &str) -> bool {
    !token.trim().is_empty()
}

/// Mask a token for display, keeping the last four characters
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

/// Write the token back to the TOML file as a backup of the database value
///
/// TOML write failures are logged and ignored; the database stays
/// authoritative.
pub fn sync_token_to_toml(token: &str, toml_path: &Path) {
    let mut config = gitviz_common::config::load_toml_config(toml_path);
    config.github_token = Some(token.to_string());

    match gitviz_common::config::write_toml_config(&config, toml_path) {
        Ok(()) => info!("GitHub token synced to TOML: {}", toml_path.display()),
        Err(e) => warn!("TOML write failed (database write succeeded): {}", e),
    }
}

const MIB_PER_SEC: f64 = 1_048_576.0;

/// Inter-chunk pause selection
///
/// Thresholds are bytes per second in binary units (1 MB/s = 1_048_576 B/s),
/// the same units `format_speed` displays.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    /// Pause when nothing has been measured or throughput is moderate
    pub default_pause: Duration,
    /// Pause when average throughput is below `slow_threshold_bps`
    pub slow_pause: Duration,
    /// Pause when average throughput is above `fast_threshold_bps`
    pub fast_pause: Duration,
    pub slow_threshold_bps: f64,
    pub fast_threshold_bps: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            default_pause: Duration::from_secs(10),
            slow_pause: Duration::from_secs(20),
            fast_pause: Duration::from_secs(5),
            slow_threshold_bps: MIB_PER_SEC,
            fast_threshold_bps: 10.0 * MIB_PER_SEC,
        }
    }
}

/// Wall-clock limits for each clone strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneTimeouts {
    pub shallow: Duration,
    pub extended: Duration,
    pub index_only: Duration,
}

impl Default for CloneTimeouts {
    fn default() -> Self {
        Self {
            shallow: Duration::from_secs(5 * 60),
            extended: Duration::from_secs(10 * 60),
            index_only: Duration::from_secs(20 * 60),
        }
    }
}

/// Resolved bulk import settings
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Directory that receives `<owner>_<name>` checkouts
    pub repos_dir: PathBuf,
    pub max_concurrent_clones: usize,
    /// Size attributed to one repository when converting clone percentages to bytes
    pub assumed_repo_size_bytes: u64,
    pub github_api_url: String,
    /// Delay between job completion and registry removal
    pub expiry: Duration,
    pub throughput_interval: Duration,
    pub pacing: PacingConfig,
    pub clone_timeouts: CloneTimeouts,
    pub default_repo_limit: usize,
}

impl ImportSettings {
    /// Compiled defaults rooted at `repos_dir`
    pub fn new(repos_dir: PathBuf) -> Self {
        Self {
            repos_dir,
            max_concurrent_clones: default_max_concurrent_clones(),
            assumed_repo_size_bytes: 10 * MIB,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            expiry: Duration::from_secs(10 * 60),
            throughput_interval: Duration::from_secs(1),
            pacing: PacingConfig::default(),
            clone_timeouts: CloneTimeouts::default(),
            default_repo_limit: DEFAULT_REPO_LIMIT,
        }
    }

    /// Apply ENV and TOML overrides on top of compiled defaults
    pub fn resolve(repos_dir: PathBuf, toml_config: &TomlConfig) -> Self {
        let mut settings = Self::new(repos_dir);
        let toml = &toml_config.bulk_import;

        let env_ceiling = std::env::var(MAX_CONCURRENT_CLONES_ENV)
            .ok()
            .and_then(|v| match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    warn!("Ignoring invalid {}={}", MAX_CONCURRENT_CLONES_ENV, v);
                    None
                }
            });

        if let Some(n) = env_ceiling.or(toml.max_concurrent_clones.filter(|n| *n > 0)) {
            settings.max_concurrent_clones = n;
        }
        if let Some(mb) = toml.assumed_repo_size_mb.filter(|mb| *mb > 0) {
            settings.assumed_repo_size_bytes = mb * MIB;
        }
        if let Some(url) = toml.github_api_url.as_ref().filter(|u| !u.trim().is_empty()) {
            settings.github_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(minutes) = toml.expiry_minutes {
            settings.expiry = Duration::from_secs(minutes * 60);
        }

        info!(
            max_concurrent_clones = settings.max_concurrent_clones,
            repos_dir = %settings.repos_dir.display(),
            github_api_url = %settings.github_api_url,
            "Bulk import settings resolved"
        );

        settings
    }

    /// Concurrency ceiling for one job, honoring a clamped per-request override
    pub fn ceiling_for(&self, requested: Option<usize>) -> usize {
        requested
            .map(|n| n.clamp(1, MAX_REQUEST_CONCURRENCY))
            .unwrap_or(self.max_concurrent_clones)
    }

    /// Per-owner repository limit, capped at [`MAX_REPO_LIMIT`]
    pub fn repo_limit_for(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|n| *n > 0)
            .unwrap_or(self.default_repo_limit)
            .min(MAX_REPO_LIMIT)
    }
}

/// clamp(cpu count, 4, 12)
pub fn default_max_concurrent_clones() -> usize {
    num_cpus::get().clamp(4, 12)
}
