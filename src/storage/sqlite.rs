use crate::models::Listing;
use crate::storage::{JsonRunLog, RecordStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Whether `name` can be spliced into SQL as a table name
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQLite table with one row per listing, keyed by listing id.
///
/// Inserting an id that is already stored does nothing.
pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
    pending: Vec<Listing>,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and make sure `table` exists
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite url '{}'", url))?
            .create_if_missing(true);
        // In-memory databases live and die with their single connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database '{}'", url))?;
        Self::with_pool(pool, table).await
    }

    pub async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self> {
        if !is_plain_identifier(table) {
            anyhow::bail!("table name '{}' is not a plain identifier", table);
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY NOT NULL,
                site TEXT NOT NULL,
                url TEXT,
                brand TEXT NOT NULL,
                page INTEGER NOT NULL,
                scraped_at TEXT NOT NULL,
                model TEXT NOT NULL,
                year INTEGER NOT NULL,
                mileage REAL,
                color TEXT,
                price REAL
            )"
        ))
        .execute(&pool)
        .await
        .with_context(|| format!("Failed to create table {}", table))?;

        Ok(Self {
            pool,
            table: table.to_string(),
            pending: Vec::new(),
        })
    }

    /// Listings queued for the next flush
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Rows currently stored
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Store every listing of a JSON run log; returns how many were new
    pub async fn import_run_log(&mut self, path: &Path) -> Result<usize> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            anyhow::bail!("run log '{}' does not exist", path.display());
        }
        let runs = JsonRunLog::load_runs(path)
            .await
            .with_context(|| format!("Failed to import run log '{}'", path.display()))?;
        let total: usize = runs.iter().map(Vec::len).sum();
        for run in runs {
            self.extend(run);
        }
        let imported = self.flush().await?;
        info!(path = %path.display(), total, imported, "import completed");
        Ok(imported)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn append(&mut self, listing: Listing) {
        self.pending.push(listing);
    }

    async fn flush(&mut self) -> Result<usize> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} \
             (id, site, url, brand, page, scraped_at, model, year, mileage, color, price) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for listing in &self.pending {
            let result = sqlx::query(&sql)
                .bind(listing.id.to_string())
                .bind(listing.site.as_str())
                .bind(listing.source_url.as_deref())
                .bind(&listing.brand)
                .bind(i64::from(listing.page))
                .bind(listing.scraped_at)
                .bind(&listing.model)
                .bind(i64::from(listing.year))
                .bind(listing.mileage)
                .bind(listing.color.as_deref())
                .bind(listing.price)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert listing {}", listing.id))?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;

        let skipped = self.pending.len() - inserted;
        self.pending.clear();
        info!(table = %self.table, inserted, skipped, "flushed listings");
        Ok(inserted)
    }
}
