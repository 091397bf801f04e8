//! Runs one test case end to end against one session.
//!
//! Flow: enter the site, open the listing, apply all facets, confirm the
//! selected-facets summary, then enumerate products and verify each one
//! against its detail document. Fatal errors end the case; fetch failures and
//! mismatches only fail the product they belong to.

use crate::cases::{FacetAxis, FacetRequest, TestCase};
use crate::detail::DetailSource;
use crate::filters::FilterOrchestrator;
use crate::navigator::SessionNavigator;
use crate::report::ArtifactStore;
use crate::results::{ProductRecord, ResultCollector};
use crate::verify::{assert_facets_applied, assert_product_matches, VerificationResult};
use crate::{PageContext, PageDriver, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::PathBuf;

/// What happened to one enumerated product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProductOutcome {
    /// Counted, but never asserted
    OutOfStock,
    /// No per-product axis was requested
    Skipped,
    Verified { results: Vec<VerificationResult> },
    /// The detail document could not be obtained
    FetchFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductVerdict {
    pub index: usize,
    pub name: String,
    pub detail_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_stock_label: Option<String>,
    #[serde(flatten)]
    pub outcome: ProductOutcome,
}

impl ProductVerdict {
    fn new(record: &ProductRecord, outcome: ProductOutcome) -> Self {
        Self {
            index: record.index,
            name: record.name.clone(),
            detail_link: record.detail_link.clone(),
            detail_stock_label: None,
            outcome,
        }
    }

    pub fn passed(&self) -> bool {
        match &self.outcome {
            ProductOutcome::OutOfStock | ProductOutcome::Skipped => true,
            ProductOutcome::Verified { results } => results.iter().all(|r| r.passed),
            ProductOutcome::FetchFailed { .. } => false,
        }
    }
}

/// Final result of one test case attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseVerdict {
    pub case_id: String,
    pub passed: bool,
    pub attempt: u32,
    pub applied_facets: Vec<VerificationResult>,
    pub products: Vec<ProductVerdict>,
    /// Error that ended the case early
    pub fatal: Option<String>,
    pub screenshot: Option<PathBuf>,
}

impl CaseVerdict {
    fn new(case_id: &str, attempt: u32) -> Self {
        Self {
            case_id: case_id.to_string(),
            passed: false,
            attempt,
            applied_facets: Vec::new(),
            products: Vec::new(),
            fatal: None,
            screenshot: None,
        }
    }

    /// A verdict for a case that never reached the page.
    pub fn fatal(case_id: &str, attempt: u32, reason: impl Into<String>) -> Self {
        Self {
            fatal: Some(reason.into()),
            ..Self::new(case_id, attempt)
        }
    }

    fn settle(&mut self) {
        self.passed = self.fatal.is_none()
            && self.applied_facets.iter().all(|r| r.passed)
            && self.products.iter().all(ProductVerdict::passed);
    }
}

pub struct CaseRunner<'a, D: PageDriver + ?Sized, S: DetailSource + ?Sized> {
    ctx: PageContext<'a, D>,
    details: &'a S,
    artifacts: Option<&'a dyn ArtifactStore>,
}

impl<'a, D: PageDriver + ?Sized, S: DetailSource + ?Sized> CaseRunner<'a, D, S> {
    pub fn new(ctx: PageContext<'a, D>, details: &'a S, artifacts: Option<&'a dyn ArtifactStore>) -> Self {
        Self { ctx, details, artifacts }
    }

    pub fn run(&self, case: &TestCase) -> CaseVerdict {
        self.run_attempt(case, 1)
    }

    pub fn run_attempt(&self, case: &TestCase, attempt: u32) -> CaseVerdict {
        info!("case {} (attempt {}): starting", case.id, attempt);
        let mut verdict = CaseVerdict::new(&case.id, attempt);

        if let Err(e) = self.execute(case, &mut verdict) {
            error!("case {}: {}", case.id, e);
            verdict.fatal = Some(e.to_string());
            verdict.screenshot = self.capture(&format!("case-{}-attempt-{}", case.id, attempt));
        }

        verdict.settle();
        verdict
    }

    fn execute(&self, case: &TestCase, verdict: &mut CaseVerdict) -> Result<()> {
        let requests = case.facet_requests();

        let navigator = SessionNavigator::new(self.ctx);
        navigator.enter(&self.ctx.config.url, &mut self.ctx.budget())?;
        navigator.goto_listing(&mut self.ctx.budget())?;

        let filters = FilterOrchestrator::new(self.ctx);
        filters.apply_all(&requests)?;

        let summary = filters.selected_facets_summary()?;
        verdict.applied_facets = assert_facets_applied(&requests, &summary);
        if verdict.applied_facets.iter().any(|r| !r.passed) {
            warn!("case {}: selected facets '{}' do not reflect the request", case.id, summary);
            return Ok(());
        }

        self.ctx.reload()?;
        let products = ResultCollector::new(self.ctx).list_products(&mut self.ctx.budget())?;
        info!("case {}: {} products listed", case.id, products.len());

        let needs_detail = requests
            .iter()
            .any(|r| !r.is_empty() && r.axis() != FacetAxis::Audience);

        verdict.products = products
            .iter()
            .map(|record| self.verify_product(record, &requests, needs_detail))
            .collect();
        Ok(())
    }

    fn verify_product(&self, record: &ProductRecord, requests: &[FacetRequest], needs_detail: bool) -> ProductVerdict {
        if !record.in_stock {
            debug!("product {} is out of stock, not asserted", record.index);
            return ProductVerdict::new(record, ProductOutcome::OutOfStock);
        }
        if !needs_detail {
            return ProductVerdict::new(record, ProductOutcome::Skipped);
        }

        let Some(link) = record.detail_link.as_deref() else {
            return ProductVerdict::new(
                record,
                ProductOutcome::FetchFailed {
                    reason: "product has no detail link".into(),
                },
            );
        };

        match self.details.fetch(link) {
            Ok(detail) => {
                let results = assert_product_matches(record, requests, &detail);
                for mismatch in results.iter().filter(|r| !r.passed) {
                    warn!("product {}: {}", record.index, mismatch);
                }
                ProductVerdict {
                    detail_stock_label: detail.stock_label().map(str::to_string),
                    ..ProductVerdict::new(record, ProductOutcome::Verified { results })
                }
            }
            Err(e) => {
                warn!("product {}: {}", record.index, e);
                ProductVerdict::new(record, ProductOutcome::FetchFailed { reason: e.to_string() })
            }
        }
    }

    fn capture(&self, name: &str) -> Option<PathBuf> {
        let store = self.artifacts?;
        let stored = self
            .ctx
            .driver
            .screenshot_png()
            .and_then(|png| store.store_screenshot(name, &png));
        match stored {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("could not capture screenshot: {}", e);
                None
            }
        }
    }
}
