pub mod browser;
pub mod details;
pub mod error;
pub mod fields;
pub mod normalizer;
pub mod pagination;
pub mod session;
pub mod sites;
pub mod snapshot;
pub mod traits;
pub mod types;

pub use browser::{ChromePageClient, ChromeSettings};
pub use details::{scrape_details, DetailProfile, ListingDetails, SpecLabel};
pub use error::{PageError, ProbeError};
pub use normalizer::{CardFields, DiscardReason, ListingNormalizer, RawCard};
pub use pagination::{HumanPacing, NoPacing, Pacing, PaginationController, Phase};
pub use session::{ScrapeSession, SessionReport, SessionSettings};
pub use sites::SiteProfile;
pub use snapshot::{Snapshot, SnapshotPageClient};
pub use traits::{ElementHandle, PageClient};
pub use types::SearchTarget;
