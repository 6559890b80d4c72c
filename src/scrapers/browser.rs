use crate::scrapers::error::PageError;
use crate::scrapers::traits::{ElementHandle, PageClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Launch settings for the headless Chrome client
#[derive(Debug, Clone)]
pub struct ChromeSettings {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub navigation_timeout: Duration,
}

impl Default for ChromeSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1600, 900),
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

/// Page client driving one tab of its own headless Chrome instance
pub struct ChromePageClient {
    // Keeps the browser process alive for as long as the tab is used
    _browser: Browser,
    tab: Arc<Tab>,
    navigation_timeout: Duration,
}

/// How often to look at the tab while waiting for a page change
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest wait for a clicked link to leave the document when the URL
/// changed but the page was rendered in place
const DETACH_GRACE: Duration = Duration::from_secs(3);

/// Run `check` every `interval` until it returns `true`; `Ok(false)` when
/// `timeout` passes first
pub async fn poll_until<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<bool, PageError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool, PageError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

impl ChromePageClient {
    /// Launch Chrome and open a tab
    pub async fn launch(settings: ChromeSettings) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::launch_blocking(&settings))
            .await
            .context("Chrome launch task panicked")?
    }

    fn launch_blocking(settings: &ChromeSettings) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .window_size(Some(settings.window_size))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open tab")?;
        tab.set_default_timeout(settings.navigation_timeout);

        Ok(Self {
            _browser: browser,
            tab,
            navigation_timeout: settings.navigation_timeout,
        })
    }

    /// Run blocking tab calls off the async runtime
    async fn with_tab<T, F>(&self, f: F) -> Result<T, PageError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, PageError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| PageError::Browser(e.to_string()))?
    }

    /// Evaluate `body` with `el` bound to the element `handle` points at
    /// (or `null` when it no longer exists)
    async fn eval_on(&self, handle: &ElementHandle, body: &str) -> Result<Value, PageError> {
        let steps = serde_json::to_string(handle.steps())
            .map_err(|e| PageError::Browser(e.to_string()))?;
        let script = format!(
            "(() => {{ let el = document; \
             for (const [s, i] of {steps}) {{ if (!el) break; el = el.querySelectorAll(s)[i]; }} \
             if (el === document) el = null; {body} }})()"
        );
        self.evaluate(script).await
    }

    async fn evaluate(&self, script: String) -> Result<Value, PageError> {
        self.with_tab(move |tab| {
            let result = tab.evaluate(&script, false).map_err(browser_error)?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
    }

    async fn count_within(&self, scope: Option<&ElementHandle>, selector: &str) -> Result<usize, PageError> {
        let selector_js =
            serde_json::to_string(selector).map_err(|e| PageError::Browser(e.to_string()))?;
        let value = match scope {
            Some(scope) => {
                self.eval_on(
                    scope,
                    &format!("if (!el) return -1; return el.querySelectorAll({selector_js}).length;"),
                )
                .await?
            }
            None => {
                self.evaluate(format!("document.querySelectorAll({selector_js}).length"))
                    .await?
            }
        };
        match value.as_i64() {
            Some(n) if n >= 0 => Ok(n as usize),
            Some(_) => Err(PageError::Detached(
                scope.map(|s| s.selector().to_string()).unwrap_or_default(),
            )),
            None => Err(PageError::InvalidSelector(selector.to_string())),
        }
    }
}

fn browser_error(e: anyhow::Error) -> PageError {
    PageError::Browser(format!("{e:#}"))
}

/// Walk a handle's lookup chain with the tab's element API
fn locate<'a>(tab: &'a Tab, handle: &ElementHandle) -> Result<Element<'a>, PageError> {
    let mut current: Option<Element<'a>> = None;
    for (selector, index) in handle.steps() {
        let mut matches = match &current {
            None => tab.find_elements(selector),
            Some(scope) => scope.find_elements(selector),
        }
        .map_err(|_| PageError::Detached(selector.clone()))?;
        if *index >= matches.len() {
            return Err(PageError::Detached(selector.clone()));
        }
        current = Some(matches.swap_remove(*index));
    }
    current.ok_or_else(|| PageError::Detached(handle.selector().to_string()))
}

#[async_trait]
impl PageClient for ChromePageClient {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let target = url.to_string();
        debug!(url, "navigating");
        self.with_tab(move |tab| {
            tab.navigate_to(&target)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| PageError::Navigation {
                    url: target.clone(),
                    reason: format!("{e:#}"),
                })
        })
        .await
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)
                .map(|_| ())
                .map_err(|_| PageError::Timeout { selector, timeout })
        })
        .await
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        let count = self.count_within(None, selector).await?;
        Ok((0..count).map(|i| ElementHandle::root(selector, i)).collect())
    }

    async fn query_within(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, PageError> {
        let count = self.count_within(Some(scope), selector).await?;
        Ok((0..count).map(|i| scope.child(selector, i)).collect())
    }

    async fn text(&self, element: &ElementHandle) -> Result<Option<String>, PageError> {
        let value = self
            .eval_on(element, "return el ? el.textContent : null;")
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        let name_js = serde_json::to_string(name).map_err(|e| PageError::Browser(e.to_string()))?;
        let value = self
            .eval_on(element, &format!("return el ? el.getAttribute({name_js}) : null;"))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        let handle = element.clone();
        self.with_tab(move |tab| {
            let target = locate(tab, &handle)?;
            target
                .scroll_into_view()
                .and_then(|el| el.click())
                .map(|_| ())
                .map_err(|e| PageError::Navigation {
                    url: tab.get_url(),
                    reason: format!("click on `{}` failed: {e:#}", handle.selector()),
                })
        })
        .await
    }

    async fn follow(&self, element: &ElementHandle) -> Result<(), PageError> {
        let before = self.current_url().await?;
        let marked = self
            .eval_on(element, "if (!el) return false; window.__carScoutFollowed = el; return true;")
            .await?;
        if marked != Value::Bool(true) {
            return Err(PageError::Detached(element.selector().to_string()));
        }

        self.click(element).await?;

        let previous = &before;
        let moved = poll_until(self.navigation_timeout, POLL_INTERVAL, || async move {
            Ok(self.current_url().await? != *previous)
        })
        .await?;
        if !moved {
            return Err(PageError::Navigation {
                url: before,
                reason: format!("page did not change within {:?} of the click", self.navigation_timeout),
            });
        }

        self.with_tab(|tab| {
            if let Err(e) = tab.wait_until_navigated() {
                debug!(error = %format!("{e:#}"), "navigation wait failed after click");
            }
            Ok(())
        })
        .await?;

        // Full loads drop the marker with the old window; in-place renders
        // must detach the clicked link before the new cards can be trusted
        let replaced = poll_until(DETACH_GRACE, POLL_INTERVAL, || async move {
            let value = self
                .evaluate(
                    "(() => { const el = window.__carScoutFollowed; return !el || !el.isConnected; })()"
                        .to_string(),
                )
                .await?;
            Ok(value == Value::Bool(true))
        })
        .await?;
        if !replaced {
            debug!(url = %before, "clicked link still attached after URL change");
        }
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), PageError> {
        self.with_tab(move |tab| {
            tab.move_mouse_to_point(Point { x, y })
                .map(|_| ())
                .map_err(browser_error)
        })
        .await
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.with_tab(|tab| Ok(tab.get_url())).await
    }

    async fn page_html(&self) -> Result<String, PageError> {
        self.with_tab(|tab| tab.get_content().map_err(browser_error))
            .await
    }
}
