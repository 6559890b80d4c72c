use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`PageClient`](super::traits::PageClient)
#[derive(Debug, Error)]
pub enum PageError {
    #[error("timed out after {timeout:?} waiting for `{selector}`")]
    Timeout { selector: String, timeout: Duration },
    #[error("element no longer matches `{0}`")]
    Detached(String),
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("browser error: {0}")]
    Browser(String),
}

impl PageError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failures while checking whether the current results page is the last one
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("pagination link `{0}` carries no page number")]
    MalformedPageLink(String),
}
