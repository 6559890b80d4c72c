//! Parsing of raw scraped text into typed values.
//!
//! Every function here is total: text that does not match yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Number followed by a standalone `k` ("120k", "85.5 K"), not part of "km".
static THOUSANDS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*[kK]\b").expect("valid regex"));

static KM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*(?i:km)").expect("valid regex"));

static BARE_NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*$").expect("valid regex"));

/// Unit marker found next to a mileage number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MileageUnit {
    /// "120k": thousands of kilometers
    Thousands,
    /// "150 km"
    Kilometers,
}

/// Result of [`parse_mileage`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MileageReading {
    pub unit: Option<MileageUnit>,
    pub value: Option<f64>,
}

impl MileageReading {
    const NONE: Self = Self {
        unit: None,
        value: None,
    };
}

/// Parse the first whitespace-delimited token as a float after removing
/// thousands separators. `"4,500 KWD"` -> `4500.0`.
pub fn parse_leading_number(text: Option<&str>) -> Option<f64> {
    let cleaned = text?.replace(',', "");
    let token = cleaned.split_whitespace().next()?;
    token.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// `Some(true)` when `10 <= |n| <= 100`.
///
/// Prices rendered this small are quoted in thousands.
pub fn is_plausible_two_digit_magnitude(n: Option<f64>) -> Option<bool> {
    n.map(|n| (10.0..=100.0).contains(&n.abs()))
}

/// Find the mileage number in `text` and the unit written next to it.
///
/// Checked in order: `<n> k`, then `<n> km` (any case), then a text that is
/// nothing but a number. The first hit wins.
pub fn parse_mileage(text: Option<&str>) -> MileageReading {
    let Some(text) = text else {
        return MileageReading::NONE;
    };

    let captured = |pattern: &Regex| {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    if let Some(value) = captured(&THOUSANDS_PATTERN) {
        return MileageReading {
            unit: Some(MileageUnit::Thousands),
            value: Some(value),
        };
    }
    if let Some(value) = captured(&KM_PATTERN) {
        return MileageReading {
            unit: Some(MileageUnit::Kilometers),
            value: Some(value),
        };
    }
    if let Some(value) = captured(&BARE_NUMBER_PATTERN) {
        return MileageReading {
            unit: None,
            value: Some(value),
        };
    }

    MileageReading::NONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("4,500 KWD"), Some(4500.0))]
    #[case(Some("9.5 KWD"), Some(9.5))]
    #[case(Some("  12,000"), Some(12000.0))]
    #[case(Some("NA"), None)]
    #[case(Some(""), None)]
    #[case(Some("   "), None)]
    #[case(Some("nan"), None)]
    #[case(None, None)]
    fn leading_number(#[case] text: Option<&str>, #[case] expected: Option<f64>) {
        assert_eq!(parse_leading_number(text), expected);
    }

    #[rstest]
    #[case(Some(10.0), Some(true))]
    #[case(Some(100.0), Some(true))]
    #[case(Some(-55.0), Some(true))]
    #[case(Some(9.5), Some(false))]
    #[case(Some(100.5), Some(false))]
    #[case(Some(4500.0), Some(false))]
    #[case(None, None)]
    fn two_digit_magnitude(#[case] n: Option<f64>, #[case] expected: Option<bool>) {
        assert_eq!(is_plausible_two_digit_magnitude(n), expected);
    }

    #[rstest]
    #[case("120k", Some(MileageUnit::Thousands), Some(120.0))]
    #[case("85.5 K", Some(MileageUnit::Thousands), Some(85.5))]
    #[case("150km", Some(MileageUnit::Kilometers), Some(150.0))]
    #[case("150 KM", Some(MileageUnit::Kilometers), Some(150.0))]
    #[case("1500 Km", Some(MileageUnit::Kilometers), Some(1500.0))]
    #[case(" 4200 ", None, Some(4200.0))]
    #[case("low mileage", None, None)]
    #[case("12 miles", None, None)]
    fn mileage(
        #[case] text: &str,
        #[case] unit: Option<MileageUnit>,
        #[case] value: Option<f64>,
    ) {
        assert_eq!(parse_mileage(Some(text)), MileageReading { unit, value });
    }

    #[test]
    fn thousands_marker_wins_over_later_km() {
        let reading = parse_mileage(Some("90 k, was 100 km"));
        assert_eq!(reading.unit, Some(MileageUnit::Thousands));
        assert_eq!(reading.value, Some(90.0));
    }

    #[test]
    fn only_ascii_digits_count() {
        assert_eq!(parse_mileage(Some("١٢٠ km")), MileageReading::NONE);
        assert_eq!(parse_mileage(Some("١٢٠k")), MileageReading::NONE);
    }

    #[test]
    fn missing_mileage_text() {
        assert_eq!(parse_mileage(None), MileageReading::NONE);
    }
}
