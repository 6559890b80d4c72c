//! Used-car listing scraper: drives marketplace result pages through a
//! browser, normalizes each listing card and stores the results.

pub mod config;
pub mod models;
pub mod scrapers;
pub mod storage;

pub use models::{Listing, Site};
