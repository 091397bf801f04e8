//! Applies facet requests one after another.
//!
//! A single facet goes open → search (if needed) → select → confirm → close.
//! Any interaction failure reloads the page and restarts the sequence from
//! `open`; the selection itself survives the reload because the page keeps
//! applied facets in its URL.

use crate::cases::FacetRequest;
use crate::dropdown::FacetDropdown;
use crate::retry::{with_retry_when, RetryBudget};
use crate::verify::contains_ignore_case;
use crate::{Error, PageContext, PageDriver, Result};
use log::{debug, info};

pub struct FilterOrchestrator<'a, D: PageDriver + ?Sized> {
    ctx: PageContext<'a, D>,
    dropdown: FacetDropdown<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> FilterOrchestrator<'a, D> {
    pub fn new(ctx: PageContext<'a, D>) -> Self {
        Self {
            ctx,
            dropdown: FacetDropdown::new(ctx),
        }
    }

    /// Apply one facet. Empty requests are skipped without touching the page.
    pub fn apply_facet(&self, request: &FacetRequest, budget: &mut RetryBudget) -> Result<()> {
        if request.is_empty() {
            debug!("{}: empty facet, skipping filter", request.name());
            return Ok(());
        }
        info!("{}: setting filter to '{}'", request.name(), request.value());

        with_retry_when(
            budget,
            &format!("set filter {}='{}'", request.name(), request.value()),
            Error::is_interaction,
            || self.apply_once(request),
            || self.ctx.reload(),
        )
    }

    fn apply_once(&self, request: &FacetRequest) -> Result<()> {
        self.dropdown.open(request.name(), &mut self.ctx.budget())?;
        if request.requires_search() {
            self.dropdown.search(request.value())?;
        }
        self.dropdown.select(request.value(), &mut self.ctx.budget())?;
        self.wait_until_applied(request.value())?;
        // A dropdown left open would cover the next facet group.
        self.dropdown.close();
        Ok(())
    }

    /// Apply every request in axis order, each with a fresh budget.
    pub fn apply_all(&self, requests: &[FacetRequest]) -> Result<()> {
        let mut ordered: Vec<&FacetRequest> = requests.iter().collect();
        ordered.sort_by_key(|r| r.axis());
        for request in ordered {
            self.apply_facet(request, &mut self.ctx.budget())?;
        }
        Ok(())
    }

    /// Text of every "selected facet" chip, space separated.
    pub fn selected_facets_summary(&self) -> Result<String> {
        let locator = self.ctx.locator();
        let chips = locator.locate_all(&self.ctx.contract().selected_facets)?;
        let texts = chips
            .iter()
            .map(|chip| self.ctx.driver.text(chip).map(|t| t.trim().to_string()))
            .collect::<Result<Vec<_>>>()?;
        Ok(texts.join(" "))
    }

    fn wait_until_applied(&self, value: &str) -> Result<()> {
        let locator = self.ctx.locator().with_timeout(self.ctx.config.confirm_timeout());
        locator.wait_until(&format!("selected facets to contain '{}'", value), || {
            Ok(contains_ignore_case(&self.selected_facets_summary()?, value))
        })
    }
}
