use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Marketplace a listing was scraped from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    FourSale,
    Motorgy,
}

impl Site {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FourSale => "four_sale",
            Self::Motorgy => "motorgy",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Site {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "four_sale" | "4sale" | "foursale" => Ok(Self::FourSale),
            "motorgy" => Ok(Self::Motorgy),
            other => anyhow::bail!("unknown site '{}'", other),
        }
    }
}

/// One normalized used-car listing.
///
/// Built once by the normalizer and then only moved: into a session's
/// result list and from there into a record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub site: Site,
    pub source_url: Option<String>,
    pub brand: String,
    /// 1-based results page the card was found on
    pub page: u32,
    pub scraped_at: DateTime<Utc>,
    pub model: String,
    /// Four-digit year, `1970` standing for "Before 1980"
    pub year: u16,
    /// Kilometers
    pub mileage: Option<f64>,
    pub color: Option<String>,
    pub price: Option<f64>,
}
