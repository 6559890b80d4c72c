//! Offline page client that replays saved results pages.
//!
//! Each snapshot is one page; following any link moves to the next
//! snapshot, which is what clicking "next" does on the live site. Plain
//! clicks leave the page as it is.

use crate::scrapers::error::PageError;
use crate::scrapers::traits::{ElementHandle, PageClient};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// One saved page
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub url: String,
    pub html: String,
}

pub struct SnapshotPageClient {
    pages: Vec<Snapshot>,
    current: AtomicUsize,
    clicks: AtomicUsize,
}

impl SnapshotPageClient {
    pub fn new(pages: Vec<Snapshot>) -> Self {
        Self {
            pages,
            current: AtomicUsize::new(0),
            clicks: AtomicUsize::new(0),
        }
    }

    /// Load pages from HTML files, in order; each file's path stands in as its URL
    pub async fn from_files<P: AsRef<Path>>(paths: &[P]) -> anyhow::Result<Self> {
        let mut pages = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let html = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read snapshot '{}': {}", path.display(), e))?;
            pages.push(Snapshot {
                url: format!("file://{}", path.display()),
                html,
            });
        }
        Ok(Self::new(pages))
    }

    pub fn first_url(&self) -> Option<&str> {
        self.pages.first().map(|p| p.url.as_str())
    }

    /// Number of clicks performed so far
    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    /// 0-based index of the page being shown
    pub fn page_index(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn page(&self) -> Result<&Snapshot, PageError> {
        self.pages
            .get(self.page_index())
            .ok_or_else(|| PageError::Browser("no snapshot loaded".to_string()))
    }

    fn document(&self) -> Result<Html, PageError> {
        Ok(Html::parse_document(&self.page()?.html))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|_| PageError::InvalidSelector(selector.to_string()))
}

fn resolve<'a>(doc: &'a Html, handle: &ElementHandle) -> Result<ElementRef<'a>, PageError> {
    let mut current: Option<ElementRef<'a>> = None;
    for (selector, index) in handle.steps() {
        let parsed = parse_selector(selector)?;
        let found = match current {
            None => doc.select(&parsed).nth(*index),
            Some(scope) => scope.select(&parsed).nth(*index),
        };
        current = Some(found.ok_or_else(|| PageError::Detached(selector.clone()))?);
    }
    current.ok_or_else(|| PageError::Detached(handle.selector().to_string()))
}

#[async_trait]
impl PageClient for SnapshotPageClient {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let index = self.pages.iter().position(|p| p.url == url).unwrap_or(0);
        if self.pages.is_empty() {
            return Err(PageError::Navigation {
                url: url.to_string(),
                reason: "no snapshots to replay".to_string(),
            });
        }
        self.current.store(index, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        let parsed = parse_selector(selector)?;
        if self.document()?.select(&parsed).next().is_some() {
            Ok(())
        } else {
            Err(PageError::Timeout {
                selector: selector.to_string(),
                timeout,
            })
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        let parsed = parse_selector(selector)?;
        let count = self.document()?.select(&parsed).count();
        Ok((0..count).map(|i| ElementHandle::root(selector, i)).collect())
    }

    async fn query_within(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, PageError> {
        let parsed = parse_selector(selector)?;
        let doc = self.document()?;
        let count = resolve(&doc, scope)?.select(&parsed).count();
        Ok((0..count).map(|i| scope.child(selector, i)).collect())
    }

    async fn text(&self, element: &ElementHandle) -> Result<Option<String>, PageError> {
        let doc = self.document()?;
        let text: String = resolve(&doc, element)?.text().collect();
        Ok(Some(text))
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        let doc = self.document()?;
        Ok(resolve(&doc, element)?.value().attr(name).map(str::to_string))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        {
            let doc = self.document()?;
            resolve(&doc, element)?;
        }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn follow(&self, element: &ElementHandle) -> Result<(), PageError> {
        {
            let doc = self.document()?;
            resolve(&doc, element)?;
        }
        let next = self.page_index() + 1;
        if next >= self.pages.len() {
            return Err(PageError::Navigation {
                url: self.page()?.url.clone(),
                reason: "no snapshot after this page".to_string(),
            });
        }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        self.current.store(next, Ordering::SeqCst);
        debug!(page = next + 1, "replaying next snapshot");
        Ok(())
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<(), PageError> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.page()?.url.clone())
    }

    async fn page_html(&self) -> Result<String, PageError> {
        Ok(self.page()?.html.clone())
    }

    async fn sleep(&self, _duration: Duration) {}
}
