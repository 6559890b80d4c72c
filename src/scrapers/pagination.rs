//! Decides after each results page whether to move on, and clicks "next".

use crate::scrapers::error::{PageError, ProbeError};
use crate::scrapers::traits::PageClient;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a site tells the scraper it is on its last results page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastPageRule {
    /// The next control is still rendered but carries `marker` as a class
    DisabledMarker { control: String, marker: String },
    /// Links inside `container` point at numbered pages via `param=<n>`;
    /// the last of `links` points at the final page
    PageNumber {
        container: String,
        links: String,
        param: String,
    },
}

impl LastPageRule {
    /// Ask the page whether it is the last one.
    pub async fn is_last_page<C>(
        &self,
        client: &C,
        current_page: u32,
        timeout: Duration,
    ) -> Result<bool, ProbeError>
    where
        C: PageClient + ?Sized,
    {
        match self {
            Self::DisabledMarker { control, marker } => {
                client.wait_for_selector(control, timeout).await?;
                let disabled = client.query_all(&format!("{control}.{marker}")).await?;
                let enabled = client
                    .query_all(&format!("{control}:not(.{marker})"))
                    .await?;
                Ok(!disabled.is_empty() && enabled.is_empty())
            }
            Self::PageNumber {
                container,
                links,
                param,
            } => {
                if client.query_all(container).await?.is_empty() {
                    return Ok(false);
                }
                let Some(last_link) = client.query_all(links).await?.pop() else {
                    return Ok(false);
                };
                let Some(href) = client.attribute(&last_link, "href").await? else {
                    return Ok(false);
                };
                let last_page = page_param(&href, param)
                    .ok_or_else(|| ProbeError::MalformedPageLink(href.clone()))?;
                let url = client.current_url().await?;
                let current = page_param(&url, param).unwrap_or(current_page);
                Ok(current >= last_page)
            }
        }
    }
}

/// Value of `param=<digits>` inside a URL or href
pub fn page_param(href: &str, param: &str) -> Option<u32> {
    let needle = format!("{param}=");
    let start = href.find(&needle)? + needle.len();
    let digits: String = href[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Source of human-like pauses between pagination actions
pub trait Pacing: Send + Sync {
    /// Pause before clicking "next"
    fn settle_delay(&self) -> Duration;

    /// Where to move the pointer before clicking
    fn pointer_target(&self) -> (f64, f64);
}

/// Randomized pacing drawn from configured ranges
#[derive(Debug, Clone)]
pub struct HumanPacing {
    pub min_settle_ms: u64,
    pub max_settle_ms: u64,
    pub pointer_min: i32,
    pub pointer_max: i32,
}

impl Default for HumanPacing {
    fn default() -> Self {
        Self {
            min_settle_ms: 1500,
            max_settle_ms: 3000,
            pointer_min: 100,
            pointer_max: 700,
        }
    }
}

impl Pacing for HumanPacing {
    fn settle_delay(&self) -> Duration {
        let high = self.max_settle_ms.max(self.min_settle_ms);
        Duration::from_millis(fastrand::u64(self.min_settle_ms..=high))
    }

    fn pointer_target(&self) -> (f64, f64) {
        let high = self.pointer_max.max(self.pointer_min);
        let x = fastrand::i32(self.pointer_min..=high);
        let y = fastrand::i32(self.pointer_min..=high);
        (f64::from(x), f64::from(y))
    }
}

/// No pauses at all; used for replays and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl Pacing for NoPacing {
    fn settle_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn pointer_target(&self) -> (f64, f64) {
        (0.0, 0.0)
    }
}

/// Where the controller is in its page loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Cards on the current page are being read
    Scraping,
    /// Clicking through to the next page
    AdvancingPage,
    /// No more pages will be visited
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    current_page: u32,
    is_terminal: bool,
}

impl PaginationState {
    fn new() -> Self {
        Self {
            current_page: 1,
            is_terminal: false,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }
}

/// Pagination settings for one site
#[derive(Debug, Clone)]
pub struct PaginationRules {
    pub last_page: LastPageRule,
    /// Clickable "next" control
    pub next_control: String,
    pub probe_timeout: Duration,
    /// Hard stop regardless of what the site reports
    pub max_pages: Option<u32>,
}

/// Page loop state machine.
///
/// Pages only move forward, and every failure to find out what comes next
/// ends the loop instead of retrying, so a session visits at most as many
/// pages as the site has.
pub struct PaginationController<P: Pacing> {
    rules: PaginationRules,
    pacing: P,
    state: PaginationState,
    phase: Phase,
}

impl<P: Pacing> PaginationController<P> {
    pub fn new(rules: PaginationRules, pacing: P) -> Self {
        Self {
            rules,
            pacing,
            state: PaginationState::new(),
            phase: Phase::Scraping,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_page(&self) -> u32 {
        self.state.current_page
    }

    /// Stop without visiting further pages
    pub fn finish(&mut self) {
        self.phase = Phase::Terminal;
        self.state.is_terminal = true;
    }

    /// Called once the current page's cards are processed.
    ///
    /// Returns `Phase::Scraping` after a successful click through to the
    /// next page and `Phase::Terminal` when the loop is over. Only a failed
    /// click is returned as an error; the controller is terminal afterwards.
    pub async fn advance<C>(&mut self, client: &C) -> Result<Phase, PageError>
    where
        C: PageClient + ?Sized,
    {
        if self.phase == Phase::Terminal {
            return Ok(Phase::Terminal);
        }
        let page = self.state.current_page;

        if self.rules.max_pages.is_some_and(|max| page >= max) {
            info!(page, "page limit reached");
            self.finish();
            return Ok(Phase::Terminal);
        }

        match self
            .rules
            .last_page
            .is_last_page(client, page, self.rules.probe_timeout)
            .await
        {
            Ok(true) => {
                info!(page, "reached final page");
                self.finish();
                return Ok(Phase::Terminal);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(page, error = %e, "last-page check failed, stopping");
                self.finish();
                return Ok(Phase::Terminal);
            }
        }

        let next = match client.query_all(&self.rules.next_control).await {
            Ok(controls) => controls.into_iter().next(),
            Err(e) => {
                warn!(page, error = %e, "could not look up next control");
                None
            }
        };
        let Some(next) = next else {
            info!(page, "no clickable next control, stopping");
            self.finish();
            return Ok(Phase::Terminal);
        };

        self.phase = Phase::AdvancingPage;
        client.sleep(self.pacing.settle_delay()).await;
        let (x, y) = self.pacing.pointer_target();
        if let Err(e) = client.mouse_move(x, y).await {
            debug!(error = %e, "mouse move failed");
        }

        if let Err(e) = client.follow(&next).await {
            self.finish();
            return Err(e);
        }

        self.state.current_page += 1;
        self.phase = Phase::Scraping;
        debug!(page = self.state.current_page, "advanced to next page");
        Ok(Phase::Scraping)
    }
}
