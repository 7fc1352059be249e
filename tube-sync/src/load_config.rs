//! `load_config` module: reads the YAML run configuration and applies
//! environment overrides.
//!
//! The file is static (no secrets); OAuth credentials live in the file named
//! by `credentials_path`. The only environment override is
//! `YOUTUBE_DAILY_QUOTA`, which replaces `daily_quota` when it holds a
//! positive integer.
//!
//! ```yaml
//! catalog_root: /srv/catalog
//! default_site_url: https://shop.example
//! daily_quota: 6
//! title_columns: [titre, name]
//! upload:
//!   privacy_status: unlisted
//!   request_timeout_ms: 600000
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info, warn};
use tube_sync_core::metadata::{Field, LandingPage, MetadataResolver};
use tube_sync_core::retry::RetryPolicy;
use tube_sync_core::transport::DEFAULT_CHUNK_SIZE;

pub const DAILY_QUOTA_ENV: &str = "YOUTUBE_DAILY_QUOTA";

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Directory holding the default-locale dataset and one sub-directory per locale.
    pub catalog_root: PathBuf,
    /// Shared per-item asset directories; defaults to `<catalog_root>/images/products`.
    #[serde(default)]
    pub asset_dir: Option<PathBuf>,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_selection_path")]
    pub selection_path: PathBuf,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    /// Used when a locale has no `site.domain` translation.
    pub default_site_url: String,
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
    /// Base column names tried for the title, each as `<name>_<locale>` then `<name>`.
    #[serde(default = "default_title_columns")]
    pub title_columns: Vec<String>,
    #[serde(default = "default_description_columns")]
    pub description_columns: Vec<String>,
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub daily_quota: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadSection {
    pub chunk_size: usize,
    pub privacy_status: String,
    pub category_id: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub connect_timeout_ms: u64,
    /// Bound on a single request, chunk PUTs included.
    pub request_timeout_ms: u64,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            privacy_status: "public".to_string(),
            category_id: "22".to_string(),
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
            connect_timeout_ms: 30_000,
            request_timeout_ms: 300_000,
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("upload_tracking.json")
}

fn default_selection_path() -> PathBuf {
    PathBuf::from("upload_config.json")
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_landing_path() -> String {
    LandingPage::default().path_template
}

fn default_title_columns() -> Vec<String> {
    vec!["title".to_string()]
}

fn default_description_columns() -> Vec<String> {
    vec!["description_short".to_string(), "description".to_string()]
}

fn default_excluded_dirs() -> Vec<String> {
    ["scripts", "config", "images", "page_html", "sauv", "CSV"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl CliConfig {
    pub fn asset_dir(&self) -> PathBuf {
        self.asset_dir
            .clone()
            .unwrap_or_else(|| self.catalog_root.join("images").join("products"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.upload.max_attempts.max(1),
            base_delay: Duration::from_millis(self.upload.base_delay_ms),
            max_delay: Duration::from_millis(self.upload.max_delay_ms),
        }
    }

    pub fn landing_page(&self) -> LandingPage {
        LandingPage {
            default_locale: self.default_locale.clone(),
            path_template: self.landing_path.clone(),
        }
    }

    pub fn metadata_resolver(&self) -> MetadataResolver {
        MetadataResolver::new(
            Field::chain(&self.title_columns),
            Field::chain(&self.description_columns),
            self.landing_page(),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.upload.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.upload.request_timeout_ms)
    }
}

/// Loads a YAML config file and applies the `YOUTUBE_DAILY_QUOTA` override.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.upload.chunk_size == 0 {
        return Err(anyhow::anyhow!("upload.chunk_size must be greater than zero"));
    }
    if config.upload.connect_timeout_ms == 0 || config.upload.request_timeout_ms == 0 {
        return Err(anyhow::anyhow!("upload timeouts must be greater than zero"));
    }
    if config.title_columns.is_empty() {
        return Err(anyhow::anyhow!("title_columns must name at least one column"));
    }
    if config.daily_quota == Some(0) {
        warn!("daily_quota of 0 in config is ignored; uploads are unlimited");
        config.daily_quota = None;
    }
    if let Some(quota) = quota_from_env() {
        info!(daily_quota = quota, "Daily quota overridden from {DAILY_QUOTA_ENV}");
        config.daily_quota = Some(quota);
    }

    info!(
        config_path = ?path_ref,
        catalog_root = %config.catalog_root.display(),
        daily_quota = ?config.daily_quota,
        "Configuration loaded"
    );
    Ok(config)
}

/// A positive `YOUTUBE_DAILY_QUOTA`, if set. Anything else is ignored.
fn quota_from_env() -> Option<u32> {
    let raw = env::var(DAILY_QUOTA_ENV).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Some(u32::try_from(n).unwrap_or(u32::MAX)),
        _ => {
            warn!(value = %raw, "Ignoring {DAILY_QUOTA_ENV}: not a positive integer");
            None
        }
    }
}
