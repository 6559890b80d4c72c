//! Detail pages of single listings: description, seller phone and the
//! specification table.

use crate::models::Site;
use crate::scrapers::error::PageError;
use crate::scrapers::traits::{ElementHandle, PageClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything read from one listing's detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDetails {
    pub site: Site,
    pub url: String,
    pub description: Option<String>,
    pub phone: Option<String>,
    /// `snake_case` label -> lowercased value
    pub specs: BTreeMap<String, String>,
}

/// Where a specification row keeps its label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecLabel {
    /// Text of the first match inside the row
    Text(&'static str),
    /// `alt` of the first matching image inside the row
    ImageAlt(&'static str),
}

/// Selectors of a site's detail page
#[derive(Debug, Clone)]
pub struct DetailProfile {
    pub site: Site,
    /// Present once the page is usable
    pub ready: &'static str,
    pub description: Option<&'static str>,
    /// Button that has to be pressed before the phone number renders
    pub phone_button: Option<&'static str>,
    pub phone: Option<&'static str>,
    pub spec_row: &'static str,
    pub spec_label: SpecLabel,
    pub spec_value: &'static str,
    pub reveal_timeout: Duration,
}

impl DetailProfile {
    pub fn for_site(site: Site) -> Self {
        match site {
            Site::FourSale => Self {
                site,
                ready: "p.text-4-regular.m-text-5-regular.text-neutral_600",
                description: Some("p.text-4-regular.m-text-5-regular.text-neutral_600"),
                phone_button: Some("button.btn.btn-prim_4sale_500.btn.btn-startIcon"),
                phone: Some("div.styles_phoneText__LmLHj.text-4-med.m-text-4-med.text-neutral_900"),
                spec_row: ".d-flex.align-items-center.bg-neutral_50.styles_attr__BN3w_",
                spec_label: SpecLabel::ImageAlt("img"),
                spec_value: ".text-4-med",
                reveal_timeout: Duration::from_secs(7),
            },
            Site::Motorgy => Self {
                site,
                ready: ".data-table__row",
                description: None,
                phone_button: None,
                phone: None,
                spec_row: ".data-table__row",
                spec_label: SpecLabel::Text("p"),
                spec_value: "span",
                reveal_timeout: Duration::from_secs(7),
            },
        }
    }
}

/// `" Fuel Type "` -> `"fuel_type"`
pub fn spec_key(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

/// Open `url` and read its detail page.
///
/// Only navigation and the initial wait fail the call; a phone number that
/// never shows up is left as `None`.
pub async fn scrape_details<C>(
    client: &C,
    profile: &DetailProfile,
    url: &str,
    timeout: Duration,
) -> Result<ListingDetails, PageError>
where
    C: PageClient + ?Sized,
{
    client.navigate(url).await?;
    client.wait_for_selector(profile.ready, timeout).await?;

    let description = match profile.description {
        Some(selector) => first_text(client, selector).await?,
        None => None,
    };
    let phone = reveal_phone(client, profile).await?;

    let mut specs = BTreeMap::new();
    for row in client.query_all(profile.spec_row).await? {
        let label = match profile.spec_label {
            SpecLabel::Text(selector) => text_within(client, &row, selector).await?,
            SpecLabel::ImageAlt(selector) => {
                match client.query_within(&row, selector).await?.first() {
                    Some(image) => client.attribute(image, "alt").await?,
                    None => None,
                }
            }
        };
        let value = text_within(client, &row, profile.spec_value).await?;

        let (Some(label), Some(value)) = (label, value) else {
            debug!(url, "spec row without label or value");
            continue;
        };
        let key = spec_key(&label);
        let value = value.trim().to_lowercase();
        if !key.is_empty() && !value.is_empty() {
            specs.insert(key, value);
        }
    }

    info!(site = %profile.site, url, specs = specs.len(), "read detail page");
    Ok(ListingDetails {
        site: profile.site,
        url: url.to_string(),
        description,
        phone,
        specs,
    })
}

async fn reveal_phone<C>(client: &C, profile: &DetailProfile) -> Result<Option<String>, PageError>
where
    C: PageClient + ?Sized,
{
    let Some(phone) = profile.phone else {
        return Ok(None);
    };
    if let Some(button) = profile.phone_button {
        match client.query_all(button).await?.first() {
            Some(button) => {
                if let Err(e) = client.click(button).await {
                    warn!(error = %e, "could not press phone button");
                    return Ok(None);
                }
            }
            None => return Ok(None),
        }
    }
    match client.wait_for_selector(phone, profile.reveal_timeout).await {
        Ok(()) => first_text(client, phone).await,
        Err(e) if e.is_timeout() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn first_text<C>(client: &C, selector: &str) -> Result<Option<String>, PageError>
where
    C: PageClient + ?Sized,
{
    match client.query_all(selector).await?.first() {
        Some(element) => Ok(trimmed(client.text(element).await?)),
        None => Ok(None),
    }
}

async fn text_within<C>(
    client: &C,
    scope: &ElementHandle,
    selector: &str,
) -> Result<Option<String>, PageError>
where
    C: PageClient + ?Sized,
{
    match client.query_within(scope, selector).await?.first() {
        Some(element) => Ok(trimmed(client.text(element).await?)),
        None => Ok(None),
    }
}

fn trimmed(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
