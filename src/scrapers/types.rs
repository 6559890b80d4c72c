use crate::models::Site;
use serde::{Deserialize, Serialize};

/// One search to scrape: a site and the brand (or listing) URL to start from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchTarget {
    pub site: Site,
    /// Brand the search is scoped to; sites that name the brand on each
    /// card override it per listing
    pub brand: String,
    pub url: String,
}

impl SearchTarget {
    pub fn new(site: Site, brand: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            site,
            brand: brand.into(),
            url: url.into(),
        }
    }
}

/// Targets used when no configuration file lists any
pub fn default_targets() -> Vec<SearchTarget> {
    vec![
        SearchTarget::new(
            Site::FourSale,
            "cadillac",
            "https://www.q84sale.com/en/automotive/cars/1/cadillac?c=520",
        ),
        SearchTarget::new(
            Site::FourSale,
            "infiniti",
            "https://www.q84sale.com/en/automotive/cars/1/infiniti-?c=524",
        ),
        SearchTarget::new(
            Site::Motorgy,
            "all",
            "https://www.motorgy.com/en/used-cars",
        ),
    ]
}
