//! Configuration for car-scout

mod logging;

pub use logging::LoggingConfig;

use crate::models::Site;
use crate::scrapers::browser::ChromeSettings;
use crate::scrapers::pagination::HumanPacing;
use crate::scrapers::session::SessionSettings;
use crate::scrapers::types::{default_targets, SearchTarget};
use crate::storage::sqlite::is_plain_identifier;
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1600,
            window_height: 900,
            navigation_timeout_secs: 60,
        }
    }
}

impl BrowserConfig {
    pub fn chrome_settings(&self) -> ChromeSettings {
        ChromeSettings {
            headless: self.headless,
            window_size: (self.window_width, self.window_height),
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
        }
    }
}

/// Page loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Wait for the first card of a page (seconds)
    pub card_timeout_secs: u64,
    /// Stop after this many pages; 0 disables the cap
    pub max_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            card_timeout_secs: 30,
            max_pages: 500,
        }
    }
}

/// Pauses between pagination actions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub min_settle_ms: u64,
    pub max_settle_ms: u64,
    pub pointer_min: i32,
    pub pointer_max: i32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        let pacing = HumanPacing::default();
        Self {
            min_settle_ms: pacing.min_settle_ms,
            max_settle_ms: pacing.max_settle_ms,
            pointer_min: pacing.pointer_min,
            pointer_max: pacing.pointer_max,
        }
    }
}

impl PacingConfig {
    pub fn human_pacing(&self) -> HumanPacing {
        HumanPacing {
            min_settle_ms: self.min_settle_ms,
            max_settle_ms: self.max_settle_ms,
            pointer_min: self.pointer_min,
            pointer_max: self.pointer_max,
        }
    }
}

/// Where results go
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for JSON run logs
    pub output_dir: PathBuf,
    /// SQLite database, e.g. `sqlite://cars.db`
    pub sqlite_url: Option<String>,
    pub table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            sqlite_url: None,
            table: "cars".to_string(),
        }
    }
}

impl StorageConfig {
    /// `car_list_<site>_<brand>_<YYYYMMDD>.json` under the output directory
    pub fn run_log_path(&self, site: Site, brand: &str, date: NaiveDate) -> PathBuf {
        let brand = brand.trim().to_lowercase().replace(' ', "_");
        self.output_dir.join(format!(
            "car_list_{}_{}_{}.json",
            site,
            brand,
            date.format("%Y%m%d")
        ))
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sessions allowed to run at once
    pub max_parallel_sessions: usize,
    /// Save page HTML here when a session fails
    pub debug_dir: Option<PathBuf>,
    pub browser: BrowserConfig,
    pub pagination: PaginationConfig,
    pub pacing: PacingConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub targets: Vec<SearchTarget>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel_sessions: 2,
            debug_dir: None,
            browser: BrowserConfig::default(),
            pagination: PaginationConfig::default(),
            pacing: PacingConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            targets: default_targets(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all fields, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.max_parallel_sessions == 0 {
            errors.push("max_parallel_sessions must be positive".to_string());
        }
        if self.pagination.card_timeout_secs == 0 {
            errors.push("pagination.card_timeout_secs must be positive".to_string());
        }
        if self.pacing.min_settle_ms > self.pacing.max_settle_ms {
            errors.push("pacing.min_settle_ms must be <= pacing.max_settle_ms".to_string());
        }
        if self.pacing.pointer_min > self.pacing.pointer_max {
            errors.push("pacing.pointer_min must be <= pacing.pointer_max".to_string());
        }
        if !is_plain_identifier(&self.storage.table) {
            errors.push(format!(
                "storage.table '{}' must be letters, digits and underscores",
                self.storage.table
            ));
        }
        for (i, target) in self.targets.iter().enumerate() {
            if target.brand.trim().is_empty() {
                errors.push(format!("targets[{}].brand must not be empty", i));
            }
            if url::Url::parse(&target.url).is_err() {
                errors.push(format!("targets[{}].url '{}' is not a URL", i, target.url));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{}", errors.join("; "))
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            card_timeout: Duration::from_secs(self.pagination.card_timeout_secs),
            max_pages: (self.pagination.max_pages > 0).then_some(self.pagination.max_pages),
            debug_dir: self.debug_dir.clone(),
        }
    }
}
