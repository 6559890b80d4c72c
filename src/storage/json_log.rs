use crate::models::Listing;
use crate::storage::RecordStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// One async lock per run-log path, shared by every `JsonRunLog` in the process
static PATH_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn path_lock(path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = PATH_LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(path.to_path_buf()).or_default())
}

/// JSON file holding one array of listings per scrape run.
///
/// Each flush appends this run's listings as a new entry; earlier runs
/// already in the file are kept.
pub struct JsonRunLog {
    path: PathBuf,
    pending: Vec<Listing>,
}

impl JsonRunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every run stored in `path`.
    ///
    /// A missing file holds no runs. Any other read or parse failure is an
    /// error.
    pub async fn load_runs(path: &Path) -> Result<Vec<Vec<Listing>>> {
        match read_log(path).await? {
            Some(content) => serde_json::from_str(&content)
                .with_context(|| format!("Run log '{}' is not valid JSON", path.display())),
            None => Ok(Vec::new()),
        }
    }

    /// Existing runs, with an unparseable file renamed out of the way
    async fn runs_for_append(&self) -> Result<Vec<Vec<Listing>>> {
        let Some(content) = read_log(&self.path).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&content) {
            Ok(runs) => Ok(runs),
            Err(e) => {
                let aside = corrupt_path(&self.path);
                tokio::fs::rename(&self.path, &aside)
                    .await
                    .with_context(|| format!("Failed to move aside {}", self.path.display()))?;
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "run log is not readable, kept a copy and starting over"
                );
                Ok(Vec::new())
            }
        }
    }
}

async fn read_log(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// `cars.json` -> `cars.json.corrupt-20241103T101500123`
fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%3f")));
    path.with_file_name(name)
}

#[async_trait]
impl RecordStore for JsonRunLog {
    fn append(&mut self, listing: Listing) {
        self.pending.push(listing);
    }

    async fn flush(&mut self) -> Result<usize> {
        let lock = path_lock(&self.path);
        let _guard = lock.lock().await;

        let mut runs = self.runs_for_append().await?;
        let count = self.pending.len();
        runs.push(self.pending.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&runs)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        self.pending.clear();

        info!(path = %self.path.display(), listings = count, runs = runs.len(), "saved run log");
        Ok(count)
    }
}
