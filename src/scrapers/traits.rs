use crate::scrapers::error::PageError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Reference to an element on the current page.
///
/// Stored as the chain of `(selector, index)` lookups that reaches it from
/// the document root, so it survives across calls into a browser tab and
/// can be resolved against a static HTML snapshot just the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementHandle {
    path: Vec<(String, usize)>,
}

impl ElementHandle {
    /// The `index`-th match of `selector` in the document
    pub fn root(selector: &str, index: usize) -> Self {
        Self {
            path: vec![(selector.to_string(), index)],
        }
    }

    /// The `index`-th match of `selector` below this element
    pub fn child(&self, selector: &str, index: usize) -> Self {
        let mut path = self.path.clone();
        path.push((selector.to_string(), index));
        Self { path }
    }

    pub fn steps(&self) -> &[(String, usize)] {
        &self.path
    }

    /// Selector of the last lookup, for error messages
    pub fn selector(&self) -> &str {
        self.path.last().map(|(s, _)| s.as_str()).unwrap_or_default()
    }
}

/// Browser capabilities a scrape session needs.
///
/// Implemented by the headless Chrome client for live runs and by the
/// snapshot client for replaying saved pages.
#[async_trait]
pub trait PageClient: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Wait until at least one element matches `selector`
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<(), PageError>;

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError>;

    async fn query_within(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, PageError>;

    /// Text content of the element, `None` when it has none
    async fn text(&self, element: &ElementHandle) -> Result<Option<String>, PageError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError>;

    /// Click an element that does not lead anywhere, like a "show phone" button
    async fn click(&self, element: &ElementHandle) -> Result<(), PageError>;

    /// Click a link to another results page.
    ///
    /// Returns once the page the click leads to has replaced the current
    /// one, so nothing read afterwards belongs to the old page.
    async fn follow(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.click(element).await
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), PageError>;

    async fn current_url(&self) -> Result<String, PageError>;

    /// Full HTML of the current page
    async fn page_html(&self) -> Result<String, PageError>;

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
