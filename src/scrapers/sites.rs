//! Selectors and card layouts of the supported marketplaces.

use crate::models::Site;
use crate::scrapers::error::PageError;
use crate::scrapers::normalizer::{CardFields, RawCard};
use crate::scrapers::pagination::{LastPageRule, PaginationRules};
use crate::scrapers::traits::{ElementHandle, PageClient};
use std::time::Duration;
use url::Url;

/// Separator between brand and model in Motorgy card titles (ARABIC LETTER MARK)
const TITLE_SEPARATOR: char = '\u{061C}';

/// Where a site puts things on its results pages
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub site: Site,
    /// One element per listing card
    pub card: &'static str,
    pub last_page: LastPageRule,
    pub next_control: &'static str,
    pub probe_timeout: Duration,
}

impl SiteProfile {
    pub fn for_site(site: Site) -> Self {
        match site {
            Site::FourSale => Self {
                site,
                card: ".StackedCard_card__Kvggc",
                last_page: LastPageRule::DisabledMarker {
                    control: r#"[data-test="type_next"]"#.to_string(),
                    marker: "styles_disabled__O4kp4".to_string(),
                },
                next_control: r#"a[data-test="type_next"]:not(.styles_disabled__O4kp4)"#,
                probe_timeout: Duration::from_secs(5),
            },
            Site::Motorgy => Self {
                site,
                card: ".card-body",
                last_page: LastPageRule::PageNumber {
                    container: "#pagingDiv".to_string(),
                    links: "a.activeLink".to_string(),
                    param: "pn".to_string(),
                },
                next_control: "#pagingDiv a:last-child",
                probe_timeout: Duration::from_secs(5),
            },
        }
    }

    pub fn pagination_rules(&self, max_pages: Option<u32>) -> PaginationRules {
        PaginationRules {
            last_page: self.last_page.clone(),
            next_control: self.next_control.to_string(),
            probe_timeout: self.probe_timeout,
            max_pages,
        }
    }

    /// Pull the raw text of one card
    pub async fn extract_card<C>(
        &self,
        client: &C,
        card: &ElementHandle,
        base_url: &str,
    ) -> Result<RawCard, PageError>
    where
        C: PageClient + ?Sized,
    {
        match self.site {
            Site::FourSale => {
                let model = first_text(client, card, ".text-6-med.text-neutral_600").await?;
                let properties = first_text(client, card, ".styles_attr___ur_q").await?;
                let price = first_text(client, card, ".h6.text-prim_4sale_500").await?;
                let link = client.attribute(card, "href").await?;

                Ok(RawCard {
                    brand: None,
                    model,
                    fields: CardFields::Bundled(properties),
                    price,
                    link: link.map(|href| absolute_link(base_url, &href)),
                })
            }
            Site::Motorgy => {
                let title = client
                    .query_within(card, ".card-title .ff-semiBold.fs-16.color_title")
                    .await?
                    .into_iter()
                    .next();
                let (name, link) = match &title {
                    Some(title) => (
                        client.text(title).await?,
                        client.attribute(title, "href").await?,
                    ),
                    None => (None, None),
                };
                let (brand, model) = match name.as_deref() {
                    Some(name) => split_title(name),
                    None => (None, None),
                };

                let year = first_text(client, card, ".feature-cars-year").await?;
                let mileage = first_text(client, card, ".feature-cars-KM").await?;

                let price = match client
                    .query_within(card, ".d-flex.justify-content-between")
                    .await?
                    .pop()
                {
                    Some(container) => {
                        first_text(client, &container, ".color_title.ff-semiBold.fs-16").await?
                    }
                    None => None,
                };

                Ok(RawCard {
                    brand,
                    model,
                    fields: CardFields::Split { year, mileage },
                    price,
                    link: link.map(|href| absolute_link(base_url, &href)),
                })
            }
        }
    }
}

async fn first_text<C>(
    client: &C,
    scope: &ElementHandle,
    selector: &str,
) -> Result<Option<String>, PageError>
where
    C: PageClient + ?Sized,
{
    match client.query_within(scope, selector).await?.first() {
        Some(element) => client.text(element).await,
        None => Ok(None),
    }
}

/// `"Land-Rover\u{061C}Range-Rover"` -> brand `"Land Rover"`, model `"Range Rover"`
fn split_title(name: &str) -> (Option<String>, Option<String>) {
    let mut parts = name.split(TITLE_SEPARATOR);
    let brand = parts
        .next()
        .map(|b| b.trim().replace('-', " "))
        .filter(|b| !b.is_empty());
    let model: String = parts.collect();
    let model = model.trim().replace('-', " ");
    (brand, (!model.is_empty()).then_some(model))
}

/// Resolve `href` against the search page URL; unparseable input is kept as is
fn absolute_link(base_url: &str, href: &str) -> String {
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_splits_on_letter_mark() {
        let (brand, model) = split_title("Land-Rover\u{061C}Range-Rover\u{061C}Sport ");
        assert_eq!(brand.as_deref(), Some("Land Rover"));
        assert_eq!(model.as_deref(), Some("Range RoverSport"));
    }

    #[test]
    fn title_without_separator_has_no_model() {
        let (brand, model) = split_title("Nissan");
        assert_eq!(brand.as_deref(), Some("Nissan"));
        assert_eq!(model, None);
    }

    #[test]
    fn relative_links_are_resolved() {
        assert_eq!(
            absolute_link(
                "https://www.q84sale.com/en/automotive/cars/1/cadillac?c=520",
                "/en/listing/escalade-19503491"
            ),
            "https://www.q84sale.com/en/listing/escalade-19503491"
        );
        assert_eq!(
            absolute_link("not a url", "/en/listing/1"),
            "/en/listing/1"
        );
    }
}
