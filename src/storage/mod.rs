//! Sinks that scraped listings are flushed into.

pub mod json_log;
pub mod sqlite;

pub use json_log::JsonRunLog;
pub use sqlite::SqliteStore;

use crate::models::Listing;
use anyhow::Result;
use async_trait::async_trait;

/// Destination for a session's listings
#[async_trait]
pub trait RecordStore: Send {
    /// Queue a listing for the next flush
    fn append(&mut self, listing: Listing);

    /// Write everything queued; returns how many listings were stored.
    ///
    /// On error nothing queued is dropped, so the flush can be retried.
    async fn flush(&mut self) -> Result<usize>;

    fn extend(&mut self, listings: Vec<Listing>) {
        for listing in listings {
            self.append(listing);
        }
    }
}
