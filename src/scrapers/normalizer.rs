//! Turns the raw text of one listing card into a [`Listing`].

use crate::models::{Listing, Site};
use crate::scrapers::fields::{
    is_plausible_two_digit_magnitude, parse_leading_number, parse_mileage, MileageReading,
    MileageUnit,
};
use chrono::{Datelike, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Year text some sites use for anything older than 1980
const BEFORE_1980: &str = "Before 1980";
const BEFORE_1980_YEAR: u16 = 1970;

/// Why a card did not become a listing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscardReason {
    #[error("card has no {0}")]
    MissingField(&'static str),
    #[error("properties carry only a year")]
    YearOnly,
    #[error("properties have {0} fields")]
    TooManyFields(usize),
    #[error("unparseable year `{0}`")]
    UnparseableYear(String),
}

/// How year, mileage and color are laid out on a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardFields {
    /// One comma-delimited string: `"2018, 120k, white"`
    Bundled(Option<String>),
    /// Year and mileage in their own slots, no color
    Split {
        year: Option<String>,
        mileage: Option<String>,
    },
}

/// Text pulled from one card, before any interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCard {
    /// Set when the card names its own brand
    pub brand: Option<String>,
    pub model: Option<String>,
    pub fields: CardFields,
    pub price: Option<String>,
    pub link: Option<String>,
}

/// Year, mileage and color text recovered from a properties string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedProperties {
    pub year: String,
    pub mileage: String,
    pub color: Option<String>,
}

/// Split a properties string on commas and decode it by field count.
///
/// Four fields means the mileage was rendered across two of them
/// (`"150"`, `"km"`) and the color sits in the fourth.
pub fn decode(properties: &str) -> Result<DecodedProperties, DiscardReason> {
    let fields: Vec<&str> = properties.split(',').map(str::trim).collect();

    match fields.as_slice() {
        [_] => Err(DiscardReason::YearOnly),
        [year, mileage] => Ok(DecodedProperties {
            year: year.to_string(),
            mileage: mileage.to_string(),
            color: Some(mileage.to_string()),
        }),
        [year, mileage, color] => Ok(DecodedProperties {
            year: year.to_string(),
            mileage: mileage.to_string(),
            color: Some(color.to_string()),
        }),
        [year, value, unit, color] => Ok(DecodedProperties {
            year: year.to_string(),
            mileage: format!("{value}{unit}"),
            color: Some(color.to_string()),
        }),
        _ => Err(DiscardReason::TooManyFields(fields.len())),
    }
}

/// Read a year slot. `"Before 1980"` maps to 1970; anything else must be a
/// four-digit year no earlier than 1970.
pub fn parse_year(text: &str) -> Result<u16, DiscardReason> {
    let text = text.trim();
    if text == BEFORE_1980 {
        return Ok(BEFORE_1980_YEAR);
    }

    let year = (text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()))
        .then(|| text.parse::<u16>().ok())
        .flatten()
        .filter(|year| *year >= BEFORE_1980_YEAR);

    year.ok_or_else(|| DiscardReason::UnparseableYear(text.to_string()))
}

/// Scale a mileage reading to kilometers.
///
/// `age` is the current year minus the listing year. Both km branches
/// are kept as observed on the sites: short readings like `"45 km"` are
/// thousands, longer ones like `"1500 km"` are hundreds.
pub fn resolve_mileage(reading: MileageReading, age: i32) -> Option<f64> {
    let value = reading.value?;

    match reading.unit {
        Some(MileageUnit::Thousands) => Some(value * 1000.0),
        Some(MileageUnit::Kilometers) if age > 0 && is_compact(value) => Some(value * 1000.0),
        Some(MileageUnit::Kilometers) if age > 0 && value.trunc() / 1000.0 < 1000.0 => {
            Some(value * 100.0)
        }
        _ => None,
    }
}

/// Whether the shortest decimal form of `value` is four characters long,
/// as in `"45.0"` or `"1.25"`: a reading already quoted in thousands.
fn is_compact(value: f64) -> bool {
    format!("{value:?}").len() == 4
}

/// Price from a price slot; small two-digit numbers are in thousands.
pub fn resolve_price(text: Option<&str>) -> Option<f64> {
    let parsed = parse_leading_number(text)?;
    let price = match is_plausible_two_digit_magnitude(Some(parsed)) {
        Some(true) => parsed * 1000.0,
        _ => parsed,
    };
    (price >= 0.0).then_some(price)
}

/// Where on a search a card was found
#[derive(Debug, Clone)]
pub struct CardContext<'a> {
    pub brand: &'a str,
    pub page: u32,
}

/// Builds listings for one site
#[derive(Debug, Clone)]
pub struct ListingNormalizer {
    site: Site,
    reference_year: i32,
}

impl ListingNormalizer {
    pub fn new(site: Site) -> Self {
        Self::with_reference_year(site, Utc::now().year())
    }

    /// Normalizer that computes vehicle age against a fixed year
    pub fn with_reference_year(site: Site, reference_year: i32) -> Self {
        Self {
            site,
            reference_year,
        }
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn normalize(&self, card: RawCard, ctx: &CardContext<'_>) -> Result<Listing, DiscardReason> {
        let (year, mileage, color) = match &card.fields {
            CardFields::Bundled(properties) => {
                let properties = properties
                    .as_deref()
                    .ok_or(DiscardReason::MissingField("properties"))?;
                let decoded = decode(properties)?;
                let year = parse_year(&decoded.year)?;
                let age = self.reference_year - i32::from(year);
                let mileage = resolve_mileage(parse_mileage(Some(&decoded.mileage)), age);
                (year, mileage, decoded.color)
            }
            CardFields::Split { year, mileage } => {
                if card.brand.is_none() && card.model.is_none() {
                    return Err(DiscardReason::MissingField("title"));
                }
                let year = year.as_deref().ok_or(DiscardReason::MissingField("year"))?;
                let year = parse_year(year)?;
                let mileage = parse_leading_number(mileage.as_deref()).filter(|m| *m >= 0.0);
                (year, mileage, None)
            }
        };

        let price = match self.site {
            Site::FourSale => resolve_price(card.price.as_deref()),
            Site::Motorgy => parse_leading_number(card.price.as_deref()).filter(|p| *p >= 0.0),
        };

        let brand = card.brand.as_deref().unwrap_or(ctx.brand);

        Ok(Listing {
            id: Uuid::new_v4(),
            site: self.site,
            source_url: card.link,
            brand: brand.trim().to_lowercase(),
            page: ctx.page,
            scraped_at: Utc::now(),
            model: card.model.as_deref().unwrap_or_default().trim().to_string(),
            year,
            mileage,
            color,
            price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn bundled(properties: &str, price: &str) -> RawCard {
        RawCard {
            brand: None,
            model: Some("  Escalade ".to_string()),
            fields: CardFields::Bundled(Some(properties.to_string())),
            price: Some(price.to_string()),
            link: Some("https://www.q84sale.com/en/listing/escalade-1".to_string()),
        }
    }

    fn ctx() -> CardContext<'static> {
        CardContext {
            brand: " Cadillac ",
            page: 3,
        }
    }

    #[test]
    fn decode_two_fields_uses_mileage_as_color() {
        let decoded = decode("2018, 120k").unwrap();
        assert_eq!(decoded.year, "2018");
        assert_eq!(decoded.mileage, "120k");
        assert_eq!(decoded.color.as_deref(), Some("120k"));
    }

    #[test]
    fn decode_three_fields() {
        let decoded = decode("2015, 45, km").unwrap();
        assert_eq!(decoded.mileage, "45");
        assert_eq!(decoded.color.as_deref(), Some("km"));
    }

    #[test]
    fn decode_four_fields_joins_mileage() {
        let decoded = decode("2015, 45, km, white").unwrap();
        assert_eq!(decoded.mileage, "45km");
        assert_eq!(decoded.color.as_deref(), Some("white"));
    }

    #[rstest]
    #[case("2020", DiscardReason::YearOnly)]
    #[case("2015, 45, km, white, extra", DiscardReason::TooManyFields(5))]
    fn decode_rejects_layout(#[case] properties: &str, #[case] reason: DiscardReason) {
        assert_eq!(decode(properties), Err(reason));
    }

    #[rstest]
    #[case("2018", Ok(2018))]
    #[case(" Before 1980 ", Ok(1970))]
    #[case("1965", Err(DiscardReason::UnparseableYear("1965".into())))]
    #[case("18", Err(DiscardReason::UnparseableYear("18".into())))]
    #[case("NA", Err(DiscardReason::UnparseableYear("NA".into())))]
    fn year_slot(#[case] text: &str, #[case] expected: Result<u16, DiscardReason>) {
        assert_eq!(parse_year(text), expected);
    }

    #[rstest]
    #[case("120k", 5, Some(120_000.0))]
    #[case("120k", 0, Some(120_000.0))]
    #[case("1500km", 4, Some(150_000.0))]
    #[case("1500 km", 4, Some(150_000.0))]
    #[case("45km", 4, Some(45_000.0))]
    #[case("1.25 km", 4, Some(1_250.0))]
    #[case("45km", 0, None)]
    #[case("45km", -1, None)]
    #[case("2500000 km", 3, None)]
    #[case("4200", 3, None)]
    fn mileage_scaling(#[case] text: &str, #[case] age: i32, #[case] expected: Option<f64>) {
        assert_eq!(resolve_mileage(parse_mileage(Some(text)), age), expected);
    }

    #[rstest]
    #[case(Some("9.5 KWD"), Some(9.5))]
    #[case(Some("10 KWD"), Some(10_000.0))]
    #[case(Some("55.5"), Some(55_500.0))]
    #[case(Some("100"), Some(100_000.0))]
    #[case(Some("4,500 KWD"), Some(4500.0))]
    #[case(Some("-20"), None)]
    #[case(Some("Call"), None)]
    #[case(None, None)]
    fn price_scaling(#[case] text: Option<&str>, #[case] expected: Option<f64>) {
        assert_eq!(resolve_price(text), expected);
    }

    #[test]
    fn before_1980_with_thousands_mileage() {
        let normalizer = ListingNormalizer::with_reference_year(Site::FourSale, 2024);
        let listing = normalizer
            .normalize(bundled("Before 1980, 120k", "15"), &ctx())
            .unwrap();

        assert_eq!(listing.year, 1970);
        assert_eq!(listing.mileage, Some(120_000.0));
        assert_eq!(listing.price, Some(15_000.0));
        assert_eq!(listing.brand, "cadillac");
        assert_eq!(listing.model, "Escalade");
        assert_eq!(listing.page, 3);
        assert_eq!(listing.site, Site::FourSale);
    }

    #[test]
    fn four_field_card_keeps_fourth_as_color() {
        let normalizer = ListingNormalizer::with_reference_year(Site::FourSale, 2024);
        let listing = normalizer
            .normalize(bundled("2015, 45, km, white", "4,500"), &ctx())
            .unwrap();

        assert_eq!(listing.mileage, Some(45_000.0));
        assert_eq!(listing.color.as_deref(), Some("white"));
        assert_eq!(listing.price, Some(4_500.0));
    }

    #[test]
    fn thousands_marker_beats_km_in_same_slot() {
        let normalizer = ListingNormalizer::with_reference_year(Site::FourSale, 2024);
        let listing = normalizer
            .normalize(bundled("2019, 90 k (100km), white", "12"), &ctx())
            .unwrap();

        assert_eq!(listing.mileage, Some(90_000.0));
        assert_eq!(listing.color.as_deref(), Some("white"));
    }

    #[rstest]
    #[case("2025, 45km, white")]
    #[case("2024, 1500 km, white")]
    fn km_mileage_needs_a_past_model_year(#[case] properties: &str) {
        let normalizer = ListingNormalizer::with_reference_year(Site::FourSale, 2024);
        let listing = normalizer.normalize(bundled(properties, "12"), &ctx()).unwrap();
        assert_eq!(listing.mileage, None);
    }

    #[test]
    fn year_only_card_is_discarded() {
        let normalizer = ListingNormalizer::with_reference_year(Site::FourSale, 2024);
        let result = normalizer.normalize(bundled("2020", "10"), &ctx());
        assert_eq!(result, Err(DiscardReason::YearOnly));
    }

    #[test]
    fn missing_properties_is_discarded() {
        let normalizer = ListingNormalizer::with_reference_year(Site::FourSale, 2024);
        let mut card = bundled("2020, 10k", "10");
        card.fields = CardFields::Bundled(None);
        assert_eq!(
            normalizer.normalize(card, &ctx()),
            Err(DiscardReason::MissingField("properties"))
        );
    }

    #[test]
    fn each_listing_gets_its_own_id() {
        let normalizer = ListingNormalizer::with_reference_year(Site::FourSale, 2024);
        let a = normalizer.normalize(bundled("2019, 30k", "12"), &ctx()).unwrap();
        let b = normalizer.normalize(bundled("2019, 30k", "12"), &ctx()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn split_card_reads_separate_slots() {
        let normalizer = ListingNormalizer::with_reference_year(Site::Motorgy, 2024);
        let card = RawCard {
            brand: Some("Land Rover".to_string()),
            model: Some("Range Rover Sport".to_string()),
            fields: CardFields::Split {
                year: Some("2021".to_string()),
                mileage: Some("35,000 KM".to_string()),
            },
            price: Some("18,750 KWD".to_string()),
            link: None,
        };

        let listing = normalizer.normalize(card, &ctx()).unwrap();
        assert_eq!(listing.brand, "land rover");
        assert_eq!(listing.year, 2021);
        assert_eq!(listing.mileage, Some(35_000.0));
        assert_eq!(listing.color, None);
        assert_eq!(listing.price, Some(18_750.0));
        assert_eq!(listing.source_url, None);
    }

    #[test]
    fn split_card_prices_are_not_scaled() {
        let normalizer = ListingNormalizer::with_reference_year(Site::Motorgy, 2024);
        let card = RawCard {
            brand: None,
            model: Some("Sunny".to_string()),
            fields: CardFields::Split {
                year: Some("2012".to_string()),
                mileage: None,
            },
            price: Some("95 KWD".to_string()),
            link: None,
        };

        let listing = normalizer.normalize(card, &ctx()).unwrap();
        assert_eq!(listing.price, Some(95.0));
        assert_eq!(listing.mileage, None);
    }
}
