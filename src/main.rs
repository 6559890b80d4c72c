use anyhow::{Context, Result};
use car_scout::config::Config;
use car_scout::models::Site;
use car_scout::scrapers::{
    scrape_details, ChromePageClient, DetailProfile, NoPacing, ScrapeSession, SearchTarget,
    SessionReport, SnapshotPageClient,
};
use car_scout::storage::{JsonRunLog, RecordStore, SqliteStore};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "car-scout")]
#[command(about = "Scrape used-car listings into JSON run logs and SQLite")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "car-scout.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the configured targets
    Scrape {
        /// Only targets on this site
        #[arg(long)]
        site: Option<Site>,

        /// Only these brands
        #[arg(short, long)]
        brand: Vec<String>,

        /// Show the browser window
        #[arg(long)]
        headful: bool,
    },

    /// Run a session over saved results pages, in order
    Replay {
        #[arg(long)]
        site: Site,

        #[arg(long)]
        brand: String,

        /// HTML files, first page first
        #[arg(required = true)]
        pages: Vec<PathBuf>,
    },

    /// Read the detail pages of single listings
    Details {
        #[arg(long)]
        site: Site,

        /// Write the details here as JSON instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Listing URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Load a JSON run log into the SQLite store
    Import {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)?;
    let _log_guard = config.logging.init(cli.verbose)?;

    info!("🚗 Car Scout");

    match cli.command {
        Commands::Scrape {
            site,
            brand,
            headful,
        } => {
            if headful {
                config.browser.headless = false;
            }
            let brands: Vec<String> = brand.iter().map(|b| b.trim().to_lowercase()).collect();
            let targets: Vec<SearchTarget> = config
                .targets
                .iter()
                .filter(|t| site.map_or(true, |s| t.site == s))
                .filter(|t| brands.is_empty() || brands.contains(&t.brand.trim().to_lowercase()))
                .cloned()
                .collect();
            if targets.is_empty() {
                anyhow::bail!("no configured target matches the filters");
            }
            scrape(Arc::new(config), targets).await
        }
        Commands::Replay { site, brand, pages } => replay(&config, site, brand, pages).await,
        Commands::Details { site, output, urls } => details(&config, site, urls, output).await,
        Commands::Import { path } => {
            let url = config
                .storage
                .sqlite_url
                .as_deref()
                .context("storage.sqlite_url is not configured")?;
            let mut store = SqliteStore::connect(url, &config.storage.table).await?;
            let imported = store.import_run_log(&path).await?;
            println!("Imported {} new listings ({} stored)", imported, store.count().await?);
            Ok(())
        }
    }
}

async fn scrape(config: Arc<Config>, targets: Vec<SearchTarget>) -> Result<()> {
    info!(sessions = targets.len(), "starting scrape");
    let permits = Arc::new(Semaphore::new(config.max_parallel_sessions));
    let mut sessions = JoinSet::new();

    for target in targets {
        let config = Arc::clone(&config);
        let permits = Arc::clone(&permits);
        sessions.spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let client = ChromePageClient::launch(config.browser.chrome_settings()).await?;
            let session = ScrapeSession::new(
                target,
                client,
                config.pacing.human_pacing(),
                config.session_settings(),
            );
            let report = session.run().await;
            persist(&config, &report).await;
            Ok::<_, anyhow::Error>(report)
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = sessions.join_next().await {
        match joined {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => error!(error = %format!("{e:#}"), "session could not start"),
            Err(e) => error!(error = %e, "session task panicked"),
        }
    }

    print_summary(&reports);
    Ok(())
}

async fn replay(config: &Config, site: Site, brand: String, pages: Vec<PathBuf>) -> Result<()> {
    let client = SnapshotPageClient::from_files(&pages).await?;
    let url = client.first_url().unwrap_or_default().to_string();
    let target = SearchTarget::new(site, brand, url);
    let report = ScrapeSession::new(target, client, NoPacing, config.session_settings())
        .run()
        .await;
    persist(config, &report).await;
    print_summary(std::slice::from_ref(&report));
    Ok(())
}

async fn details(
    config: &Config,
    site: Site,
    urls: Vec<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = ChromePageClient::launch(config.browser.chrome_settings()).await?;
    let profile = DetailProfile::for_site(site);
    let timeout = config.session_settings().card_timeout;

    let mut found = Vec::with_capacity(urls.len());
    for url in &urls {
        match scrape_details(&client, &profile, url, timeout).await {
            Ok(details) => found.push(details),
            Err(e) => error!(%site, %url, error = %e, "could not read detail page"),
        }
    }

    let json = serde_json::to_string_pretty(&found)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), pages = found.len(), "saved listing details");
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Flush a session's listings to every configured store.
///
/// Runs for failed sessions too, so partial results are kept.
async fn persist(config: &Config, report: &SessionReport) {
    if report.listings.is_empty() {
        warn!(brand = %report.brand, "nothing to save");
        return;
    }

    let path = config
        .storage
        .run_log_path(report.site, &report.brand, Local::now().date_naive());
    let mut run_log = JsonRunLog::new(path);
    run_log.extend(report.listings.clone());
    if let Err(e) = run_log.flush().await {
        error!(brand = %report.brand, error = %format!("{e:#}"), "could not save run log");
    }

    if let Some(url) = &config.storage.sqlite_url {
        let stored = async {
            let mut store = SqliteStore::connect(url, &config.storage.table).await?;
            store.extend(report.listings.clone());
            store.flush().await
        };
        if let Err(e) = stored.await {
            error!(brand = %report.brand, error = %format!("{e:#}"), "could not save to database");
        }
    }
}

fn print_summary(reports: &[SessionReport]) {
    println!();
    for report in reports {
        let status = match &report.failure {
            Some(reason) => format!("stopped early: {}", reason),
            None => "complete".to_string(),
        };
        println!("{} / {} ({})", report.site, report.brand, status);
        println!("   {} listings from {} pages", report.listings.len(), report.pages_visited);
        println!(
            "   {} cards seen, {} discarded",
            report.cards_seen, report.cards_discarded
        );
        println!("   URL: {}", report.url);
        println!();
    }
}
