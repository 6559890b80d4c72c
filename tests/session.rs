//! Whole sessions replayed over saved results pages.

use async_trait::async_trait;
use car_scout::models::Site;
use car_scout::scrapers::{
    ElementHandle, ListingNormalizer, NoPacing, PageClient, PageError, ScrapeSession,
    SearchTarget, SessionSettings, Snapshot, SnapshotPageClient,
};
use std::time::Duration;
use tempfile::TempDir;

const CADILLAC_URL: &str = "https://www.q84sale.com/en/automotive/cars/1/cadillac?c=520";
const MOTORGY_URL: &str = "https://www.motorgy.com/en/used-cars";

fn four_sale_card(href: &str, model: &str, properties: &str, price: &str) -> String {
    format!(
        r#"<a class="StackedCard_card__Kvggc" href="{href}">
            <div class="text-6-med text-neutral_600"> {model} </div>
            <div class="styles_attr___ur_q">{properties}</div>
            <span class="h6 text-prim_4sale_500">{price}</span>
        </a>"#
    )
}

fn four_sale_page(cards: &[String], next_disabled: bool) -> String {
    let next = if next_disabled {
        r#"<a data-test="type_next" class="styles_disabled__O4kp4">Next</a>"#
    } else {
        r#"<a data-test="type_next" href="?c=520&page=2">Next</a>"#
    };
    format!(
        "<html><body><main>{}</main><nav>{}</nav></body></html>",
        cards.concat(),
        next
    )
}

fn session(
    site: Site,
    url: &str,
    pages: Vec<Snapshot>,
    settings: SessionSettings,
) -> ScrapeSession<SnapshotPageClient, NoPacing> {
    let brand = match site {
        Site::FourSale => "Cadillac",
        Site::Motorgy => "all",
    };
    ScrapeSession::with_normalizer(
        SearchTarget::new(site, brand, url),
        SnapshotPageClient::new(pages),
        NoPacing,
        settings,
        ListingNormalizer::with_reference_year(site, 2024),
    )
}

fn fast_settings() -> SessionSettings {
    SessionSettings {
        card_timeout: Duration::from_millis(10),
        ..SessionSettings::default()
    }
}

#[tokio::test]
async fn four_sale_session_walks_every_page() {
    let page_one = four_sale_page(
        &[
            four_sale_card("/en/listing/escalade-1", "Escalade", "2019, 45k, Black", "15 KWD"),
            four_sale_card("/en/listing/ct5-2", "CT5", "2020", "11 KWD"),
        ],
        false,
    );
    let page_two = four_sale_page(
        &[four_sale_card(
            "/en/listing/deville-3",
            "DeVille",
            "Before 1980, 120k",
            "9.5 KWD",
        )],
        true,
    );
    let pages = vec![
        Snapshot {
            url: CADILLAC_URL.to_string(),
            html: page_one,
        },
        Snapshot {
            url: format!("{CADILLAC_URL}&page=2"),
            html: page_two,
        },
    ];

    let report = session(Site::FourSale, CADILLAC_URL, pages, fast_settings())
        .run()
        .await;

    assert!(report.failure.is_none());
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.cards_seen, 3);
    assert_eq!(report.cards_discarded, 1);
    assert_eq!(report.listings.len(), 2);

    let escalade = &report.listings[0];
    assert_eq!(escalade.brand, "cadillac");
    assert_eq!(escalade.model, "Escalade");
    assert_eq!(escalade.page, 1);
    assert_eq!(escalade.year, 2019);
    assert_eq!(escalade.mileage, Some(45_000.0));
    assert_eq!(escalade.color.as_deref(), Some("Black"));
    assert_eq!(escalade.price, Some(15_000.0));
    assert_eq!(
        escalade.source_url.as_deref(),
        Some("https://www.q84sale.com/en/listing/escalade-1")
    );

    let deville = &report.listings[1];
    assert_eq!(deville.page, 2);
    assert_eq!(deville.year, 1970);
    assert_eq!(deville.mileage, Some(120_000.0));
    assert_eq!(deville.price, Some(9.5));
    assert_ne!(escalade.id, deville.id);
}

#[tokio::test]
async fn failed_navigation_keeps_partial_results_and_dumps_page() {
    let debug_dir = TempDir::new().unwrap();
    let only_page = four_sale_page(
        &[four_sale_card("/en/listing/xt5-9", "XT5", "2021, 30k, White", "12")],
        false,
    );
    let pages = vec![Snapshot {
        url: CADILLAC_URL.to_string(),
        html: only_page,
    }];
    let settings = SessionSettings {
        debug_dir: Some(debug_dir.path().to_path_buf()),
        ..fast_settings()
    };

    let report = session(Site::FourSale, CADILLAC_URL, pages, settings).run().await;

    assert!(report.failure.is_some());
    assert_eq!(report.listings.len(), 1);
    assert_eq!(report.listings[0].model, "XT5");
    assert!(debug_dir.path().join("four_sale_Cadillac_p1.html").exists());
}

#[tokio::test]
async fn next_control_vanishing_keeps_earlier_pages() {
    let page_one = four_sale_page(
        &[four_sale_card("/en/listing/ats-1", "ATS", "2017, 80k, Grey", "6")],
        false,
    );
    // Second page renders cards but no pagination at all
    let page_two = format!(
        "<html><body><main>{}</main></body></html>",
        four_sale_card("/en/listing/cts-2", "CTS", "2016, 95k, Red", "5.5")
    );
    let pages = vec![
        Snapshot {
            url: CADILLAC_URL.to_string(),
            html: page_one,
        },
        Snapshot {
            url: format!("{CADILLAC_URL}&page=2"),
            html: page_two,
        },
    ];

    let report = session(Site::FourSale, CADILLAC_URL, pages, fast_settings())
        .run()
        .await;

    assert!(report.failure.is_none());
    assert_eq!(report.pages_visited, 2);
    let models: Vec<_> = report.listings.iter().map(|l| l.model.as_str()).collect();
    assert_eq!(models, ["ATS", "CTS"]);
    assert_eq!(report.listings[0].page, 1);
    assert_eq!(report.listings[1].page, 2);
}

/// Snapshot client whose first card goes stale while it is being read
struct StaleFirstCard(SnapshotPageClient);

#[async_trait]
impl PageClient for StaleFirstCard {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.0.navigate(url).await
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        self.0.wait_for_selector(selector, timeout).await
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        self.0.query_all(selector).await
    }

    async fn query_within(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, PageError> {
        if scope == &ElementHandle::root(".StackedCard_card__Kvggc", 0) {
            return Err(PageError::Detached(selector.to_string()));
        }
        self.0.query_within(scope, selector).await
    }

    async fn text(&self, element: &ElementHandle) -> Result<Option<String>, PageError> {
        self.0.text(element).await
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        self.0.attribute(element, name).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.0.click(element).await
    }

    async fn follow(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.0.follow(element).await
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), PageError> {
        self.0.mouse_move(x, y).await
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.0.current_url().await
    }

    async fn page_html(&self) -> Result<String, PageError> {
        self.0.page_html().await
    }

    async fn sleep(&self, _duration: Duration) {}
}

#[tokio::test]
async fn unreadable_card_is_skipped() {
    let html = four_sale_page(
        &[
            four_sale_card("/en/listing/srx-1", "SRX", "2012, 150k, Silver", "3"),
            four_sale_card("/en/listing/xt4-2", "XT4", "2022, 20k, Blue", "14"),
        ],
        true,
    );
    let client = StaleFirstCard(SnapshotPageClient::new(vec![Snapshot {
        url: CADILLAC_URL.to_string(),
        html,
    }]));

    let report = ScrapeSession::with_normalizer(
        SearchTarget::new(Site::FourSale, "Cadillac", CADILLAC_URL),
        client,
        NoPacing,
        fast_settings(),
        ListingNormalizer::with_reference_year(Site::FourSale, 2024),
    )
    .run()
    .await;

    assert!(report.failure.is_none());
    assert_eq!(report.cards_seen, 2);
    assert_eq!(report.cards_discarded, 1);
    assert_eq!(report.listings.len(), 1);
    assert_eq!(report.listings[0].model, "XT4");
}

#[tokio::test]
async fn page_without_cards_ends_quietly() {
    let pages = vec![Snapshot {
        url: CADILLAC_URL.to_string(),
        html: "<html><body><p>No results</p></body></html>".to_string(),
    }];

    let report = session(Site::FourSale, CADILLAC_URL, pages, fast_settings())
        .run()
        .await;

    assert!(report.failure.is_none());
    assert!(report.listings.is_empty());
    assert_eq!(report.cards_seen, 0);
    assert_eq!(report.pages_visited, 1);
}

#[tokio::test]
async fn motorgy_cards_use_separate_slots() {
    let html = format!(
        r#"<html><body>
        <div class="card-body">
            <div class="card-title">
                <a class="ff-semiBold fs-16 color_title" href="/en/car-details/nissan-sunny/47968">Nissan{sep}Sunny</a>
            </div>
            <span class="feature-cars-year me-2 ff-semiBold fs-12 color_title">2018</span>
            <span class="feature-cars-KM ff-semiBold me-2 fs-12 color_subtitle">120,000 KM</span>
            <div class="d-flex justify-content-between"><span>Price</span></div>
            <div class="d-flex justify-content-between">
                <span class="color_title ff-semiBold fs-16">3,250 KWD</span>
            </div>
        </div>
        <div class="card-body">
            <span class="feature-cars-year me-2 ff-semiBold fs-12 color_title">2016</span>
            <span class="feature-cars-KM ff-semiBold me-2 fs-12 color_subtitle">80,000 KM</span>
        </div>
        <div id="pagingDiv">
            <a class="activeLink" href="/en/used-cars?pn=1">1</a>
            <a class="activeLink" href="/en/used-cars?pn=1">&raquo;</a>
        </div>
        </body></html>"#,
        sep = '\u{061C}'
    );
    let pages = vec![Snapshot {
        url: MOTORGY_URL.to_string(),
        html,
    }];

    let client_session = session(Site::Motorgy, MOTORGY_URL, pages, fast_settings());
    assert_eq!(client_session.client().clicks(), 0);
    let report = client_session.run().await;

    assert!(report.failure.is_none());
    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.cards_seen, 2);
    assert_eq!(report.cards_discarded, 1);

    let sunny = &report.listings[0];
    assert_eq!(sunny.site, Site::Motorgy);
    assert_eq!(sunny.brand, "nissan");
    assert_eq!(sunny.model, "Sunny");
    assert_eq!(sunny.year, 2018);
    assert_eq!(sunny.mileage, Some(120_000.0));
    assert_eq!(sunny.color, None);
    assert_eq!(sunny.price, Some(3_250.0));
    assert_eq!(
        sunny.source_url.as_deref(),
        Some("https://www.motorgy.com/en/car-details/nissan-sunny/47968")
    );
}
