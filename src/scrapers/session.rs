use crate::models::{Listing, Site};
use crate::scrapers::error::PageError;
use crate::scrapers::normalizer::{CardContext, ListingNormalizer};
use crate::scrapers::pagination::{Pacing, PaginationController, Phase};
use crate::scrapers::sites::SiteProfile;
use crate::scrapers::traits::PageClient;
use crate::scrapers::types::SearchTarget;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Knobs for a single session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How long to wait for the first card of a page to render
    pub card_timeout: Duration,
    pub max_pages: Option<u32>,
    /// Where to dump the page HTML when the session fails
    pub debug_dir: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            card_timeout: Duration::from_secs(30),
            max_pages: Some(500),
            debug_dir: None,
        }
    }
}

/// What a session produced
#[derive(Debug)]
pub struct SessionReport {
    pub site: Site,
    pub brand: String,
    pub url: String,
    pub listings: Vec<Listing>,
    pub pages_visited: u32,
    pub cards_seen: usize,
    pub cards_discarded: usize,
    /// Set when the session ended on an error rather than on the last page
    pub failure: Option<String>,
}

/// Scrapes every results page of one search.
///
/// Owns its page client and its result list; nothing is shared with other
/// sessions, which can run on their own tasks.
pub struct ScrapeSession<C: PageClient, P: Pacing> {
    target: SearchTarget,
    profile: SiteProfile,
    client: C,
    controller: PaginationController<P>,
    normalizer: ListingNormalizer,
    settings: SessionSettings,
    listings: Vec<Listing>,
    cards_seen: usize,
    cards_discarded: usize,
}

impl<C: PageClient, P: Pacing> ScrapeSession<C, P> {
    pub fn new(target: SearchTarget, client: C, pacing: P, settings: SessionSettings) -> Self {
        let normalizer = ListingNormalizer::new(target.site);
        Self::with_normalizer(target, client, pacing, settings, normalizer)
    }

    pub fn with_normalizer(
        target: SearchTarget,
        client: C,
        pacing: P,
        settings: SessionSettings,
        normalizer: ListingNormalizer,
    ) -> Self {
        let profile = SiteProfile::for_site(target.site);
        let controller = PaginationController::new(profile.pagination_rules(settings.max_pages), pacing);
        Self {
            target,
            profile,
            client,
            controller,
            normalizer,
            settings,
            listings: Vec::new(),
            cards_seen: 0,
            cards_discarded: 0,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run until the last page or the first navigation failure.
    ///
    /// Never fails: whatever was collected before an error is returned in
    /// the report together with the error message.
    pub async fn run(mut self) -> SessionReport {
        let site = self.target.site;
        let brand = self.target.brand.clone();
        let url = self.target.url.clone();
        info!(%site, %brand, %url, "starting session");

        let failure = match self.page_loop().await {
            Ok(()) => None,
            Err(e) => {
                let page = self.controller.current_page();
                error!(%site, %brand, %url, page, error = %e, "session aborted");
                self.dump_page(page).await;
                Some(e.to_string())
            }
        };

        info!(
            %site,
            %brand,
            listings = self.listings.len(),
            discarded = self.cards_discarded,
            pages = self.controller.current_page(),
            "session finished"
        );

        SessionReport {
            site,
            brand,
            url,
            listings: self.listings,
            pages_visited: self.controller.current_page(),
            cards_seen: self.cards_seen,
            cards_discarded: self.cards_discarded,
            failure,
        }
    }

    async fn page_loop(&mut self) -> Result<(), PageError> {
        self.client.navigate(&self.target.url).await?;

        loop {
            let page = self.controller.current_page();

            match self
                .client
                .wait_for_selector(self.profile.card, self.settings.card_timeout)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_timeout() => {
                    warn!(brand = %self.target.brand, page, "no cards rendered, treating page as empty");
                    self.controller.finish();
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            self.scrape_page(page).await?;

            if self.controller.advance(&self.client).await? == Phase::Terminal {
                return Ok(());
            }
        }
    }

    async fn scrape_page(&mut self, page: u32) -> Result<(), PageError> {
        let cards = self.client.query_all(self.profile.card).await?;
        info!(brand = %self.target.brand, page, cards = cards.len(), "found cards");

        for card in &cards {
            self.cards_seen += 1;
            let raw = match self
                .profile
                .extract_card(&self.client, card, &self.target.url)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    self.cards_discarded += 1;
                    warn!(brand = %self.target.brand, page, error = %e, "could not read card");
                    continue;
                }
            };
            let ctx = CardContext {
                brand: &self.target.brand,
                page,
            };
            match self.normalizer.normalize(raw, &ctx) {
                Ok(listing) => self.listings.push(listing),
                Err(reason) => {
                    self.cards_discarded += 1;
                    debug!(page, %reason, "discarded card");
                }
            }
        }

        info!(total = self.listings.len(), "cars scraped so far");
        Ok(())
    }

    async fn dump_page(&self, page: u32) {
        let Some(dir) = &self.settings.debug_dir else {
            return;
        };
        let html = match self.client.page_html().await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "could not capture page HTML");
                return;
            }
        };
        let path = dir.join(format!(
            "{}_{}_p{}.html",
            self.target.site,
            self.target.brand.replace(' ', "-"),
            page
        ));
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, html).await
        };
        match written.await {
            Ok(()) => info!(path = %path.display(), "saved page HTML"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not save page HTML"),
        }
    }
}
