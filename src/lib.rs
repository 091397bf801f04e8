//! facetprobe
//!
//! A resilient interaction and verification engine for faceted product search
//! on listing pages whose DOM reflows, replaces elements and occasionally
//! refuses to respond.
//!
//! The engine applies a set of facet filters (category, brand, highlight badge,
//! gift occasion, audience) through a live browser session, then checks that
//! every displayed product matches them by reconciling the result tile with a
//! separately fetched copy of the product's detail page.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives a headless Chrome through `headless_chrome`
//! - **Port-based design**: every component talks to the page through the
//!   [`PageDriver`] trait, so the engine runs against scripted pages in tests
//! - **Bounded retries**: every flaky step runs inside an explicit
//!   [`retry::RetryBudget`] loop with a page reload as recovery
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use facetprobe::cases::TestCase;
//! use facetprobe::detail::DetailFetcher;
//! use facetprobe::report::{LogReportSink, ReportSink};
//! use facetprobe::runner::CaseRunner;
//! use facetprobe::{PageContext, ProbeConfig};
//!
//! let config = ProbeConfig::default();
//! let page = facetprobe::cdp::CdpPage::launch(&config)?;
//! let details = DetailFetcher::new(&config)?;
//! let sink = LogReportSink;
//!
//! let case = TestCase { category: "Parfum".into(), highlight: "Neu".into(), ..Default::default() };
//! let runner = CaseRunner::new(PageContext::new(&page, &config), &details, None);
//! let verdict = runner.run(&case);
//! sink.record(&verdict);
//! println!("passed: {}", verdict.passed);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "cdp"))]
//! # fn main() {}
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod cases;
pub mod detail;
pub mod dropdown;
pub mod filters;
pub mod locator;
pub mod navigator;
pub mod report;
pub mod results;
pub mod retry;
pub mod runner;
pub mod suite;
pub mod verify;

// CDP adapter for the PageDriver port
#[cfg(feature = "cdp")]
pub mod cdp;

pub use cases::{FacetAxis, FacetRequest, TestCase};
pub use locator::Locator;
pub use retry::RetryBudget;

/// Configuration for a verification run
///
/// Defaults mirror the settings the engine was tuned against: ten second
/// waits, twenty seconds for the selected-facet summary to confirm a choice,
/// and three retries per flaky operation.
///
/// # Examples
///
/// ```
/// let cfg = facetprobe::ProbeConfig::default();
/// assert_eq!(cfg.max_retries, 3);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Entry URL of the storefront
    pub url: String,
    /// Timeout for every bounded wait in milliseconds
    pub timeout_ms: u64,
    /// Timeout for the selected-facets summary to confirm a selection
    pub confirm_timeout_ms: u64,
    /// Delay between condition polls in milliseconds
    pub poll_interval_ms: u64,
    /// Budget seed for every retried operation
    pub max_retries: u32,
    /// How often a failed test case may be re-run
    pub case_retries: u32,
    /// Timeout for a detail document fetch in milliseconds
    pub fetch_timeout_ms: u64,
    /// Extra attempts for a detail fetch that failed on the network
    pub fetch_retries: u32,
    /// User agent sent by the browser session and the detail fetcher
    pub user_agent: String,
    /// Browser window dimensions
    pub viewport: Viewport,
    /// Whether to launch the browser headless
    pub headless: bool,
    /// Maximum number of test cases running at once
    pub parallelism: usize,
    /// Where fatal-failure screenshots are written
    pub artifacts_dir: Option<PathBuf>,
    /// Selectors the engine relies on
    pub contract: PageContract,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "https://www.douglas.de/de".to_string(),
            timeout_ms: 10_000,
            confirm_timeout_ms: 20_000,
            poll_interval_ms: 250,
            max_retries: 3,
            case_retries: 3,
            fetch_timeout_ms: 15_000,
            fetch_retries: 1,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            viewport: Viewport::default(),
            headless: true,
            parallelism: num_cpus::get(),
            artifacts_dir: None,
            contract: PageContract::default(),
        }
    }
}

impl ProbeConfig {
    /// Load a JSON settings file; absent keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: ProbeConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::ConfigError("url must not be empty".into()));
        }
        if self.timeout_ms == 0 || self.confirm_timeout_ms == 0 || self.fetch_timeout_ms == 0 {
            return Err(Error::ConfigError("timeouts must be greater than zero".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::ConfigError("poll_interval_ms must be greater than zero".into()));
        }
        if self.parallelism == 0 {
            return Err(Error::ConfigError("parallelism must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// A fresh budget seeded from `max_retries`.
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_retries)
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1800,
            height: 1000,
        }
    }
}

/// The logical selectors the engine depends on.
///
/// Renaming any of these on the target site breaks the engine; override them
/// in the settings file rather than in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContract {
    pub consent_overlay: String,
    pub consent_accept: String,
    pub listing_entry: String,
    /// Neutral element the cursor is parked on after navigating
    pub header: String,
    pub facet_group: String,
    pub facet_title: String,
    pub facet_option: String,
    pub facet_option_label: String,
    pub facet_option_checkbox: String,
    pub facet_search: String,
    pub facet_close: String,
    /// Text the close control carries once the dropdown is fully open
    pub close_label: String,
    pub selected_facets: String,
    pub product_tile: String,
    pub tile_category: String,
    pub tile_brand: String,
    pub tile_name: String,
    pub tile_badges: String,
    pub tile_sale_marker: String,
    pub tile_new_marker: String,
    pub tile_out_of_stock: String,
    pub tile_link: String,
    pub detail_classification: String,
    pub detail_badges: String,
    pub detail_gift_label: String,
    pub detail_stock_label: String,
}

impl Default for PageContract {
    fn default() -> Self {
        Self {
            consent_overlay: ".modal-overlay__display".into(),
            consent_accept: ".button.button__primary.uc-list-button__accept-all".into(),
            listing_entry: ".navigation-main-entry a[href='/de/c/parfum/01']".into(),
            header: ".header-component__container".into(),
            facet_group: ".facet".into(),
            facet_title: ".facet__title".into(),
            facet_option: "a[class*='facet-option']".into(),
            facet_option_label: ".facet-option__checkbox--rating-stars".into(),
            facet_option_checkbox: ".facet-option__checkbox".into(),
            facet_search: "input[name='facet-search']".into(),
            facet_close: ".facet__close-button".into(),
            close_label: "SCHLIESSEN".into(),
            selected_facets: ".selected-facets a".into(),
            product_tile: ".product-tile".into(),
            tile_category: ".category".into(),
            tile_brand: ".top-brand".into(),
            tile_name: ".name".into(),
            tile_badges: ".eyecatcher span".into(),
            tile_sale_marker: ".eyecatcher--discount".into(),
            tile_new_marker: ".eyecatcher--new".into(),
            tile_out_of_stock: ".out-of-stock".into(),
            tile_link: ".link".into(),
            detail_classification: ".classification".into(),
            detail_badges: ".eyecatcher span".into(),
            detail_gift_label: "Geschenk Für".into(),
            detail_stock_label: ".out-of-stock .label-text".into(),
        }
    }
}

/// Opaque reference to a node located on the live page.
///
/// A handle stays valid only while the node it was taken from is attached;
/// afterwards every operation on it fails with [`Error::Stale`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub id: u64,
    /// Selector the handle was located with (diagnostics only)
    pub selector: String,
}

impl ElementHandle {
    pub fn new(id: u64, selector: impl Into<String>) -> Self {
        Self {
            id,
            selector: selector.into(),
        }
    }
}

/// Blocking port to an interactive page session.
///
/// Implementations must only hand out handles for nodes attached at the time
/// of the call and must report operations on replaced nodes as
/// [`Error::Stale`].
pub trait PageDriver {
    /// Navigate to a URL and wait for the navigation to settle
    fn navigate(&self, url: &str) -> Result<()>;

    /// Reload the current page
    fn reload(&self) -> Result<()>;

    fn current_url(&self) -> Result<String>;

    /// All nodes matching `selector`, searched within `scope` when given
    fn query_all(&self, scope: Option<&ElementHandle>, selector: &str) -> Result<Vec<ElementHandle>>;

    /// Rendered text of the node
    fn text(&self, element: &ElementHandle) -> Result<String>;

    /// Attribute value, resolved the way the page reports it (links are absolute)
    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    fn is_displayed(&self, element: &ElementHandle) -> Result<bool>;

    fn is_enabled(&self, element: &ElementHandle) -> Result<bool>;

    fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Move the pointer over the node
    fn hover(&self, element: &ElementHandle) -> Result<()>;

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()>;

    /// Focus the node and type `text` into it
    fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()>;

    /// Capture the viewport as PNG bytes
    fn screenshot_png(&self) -> Result<Vec<u8>>;
}

/// The session value every component works against.
///
/// Holds the page port and the run configuration; components take it by value
/// instead of looking up a per-thread driver.
pub struct PageContext<'a, D: PageDriver + ?Sized> {
    pub driver: &'a D,
    pub config: &'a ProbeConfig,
}

impl<'a, D: PageDriver + ?Sized> Clone for PageContext<'a, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, D: PageDriver + ?Sized> Copy for PageContext<'a, D> {}

impl<'a, D: PageDriver + ?Sized> PageContext<'a, D> {
    pub fn new(driver: &'a D, config: &'a ProbeConfig) -> Self {
        Self { driver, config }
    }

    pub fn locator(&self) -> Locator<'a, D> {
        Locator::new(self.driver, self.config.timeout(), self.config.poll_interval())
    }

    pub fn contract(&self) -> &'a PageContract {
        &self.config.contract
    }

    pub fn budget(&self) -> RetryBudget {
        self.config.budget()
    }

    /// Recovery action shared by every retried step.
    pub fn reload(&self) -> Result<()> {
        self.driver.reload()
    }
}
