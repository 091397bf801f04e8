//! Facet dropdown interactions: open a group, narrow it, tick an option, close it.
//!
//! Opening a dropdown is the flakiest step of the whole flow, so `open` retries
//! itself when the options do not show up. Option lists are re-rendered more
//! often than anything else on the page, so `select` is the only step that
//! retries on staleness.

use crate::retry::{no_recovery, with_retry_when, RetryBudget};
use crate::verify::{labels_match, option_matches};
use crate::{Error, PageContext, PageDriver, Result};
use log::{debug, info, warn};

pub struct FacetDropdown<'a, D: PageDriver + ?Sized> {
    ctx: PageContext<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> FacetDropdown<'a, D> {
    pub fn new(ctx: PageContext<'a, D>) -> Self {
        Self { ctx }
    }

    /// Open the facet group labelled `facet_name` (case-insensitive).
    pub fn open(&self, facet_name: &str, budget: &mut RetryBudget) -> Result<()> {
        let contract = self.ctx.contract();
        let locator = self.ctx.locator();

        // An unhydrated facet bar would otherwise look like "no such facet".
        locator.wait_present(&contract.facet_group)?;

        with_retry_when(
            budget,
            &format!("open facet dropdown '{}'", facet_name),
            |e| matches!(e, Error::WaitTimeout { .. }),
            || {
                self.activate_group(facet_name)?;
                locator.wait_any_clickable(&contract.facet_option_checkbox)?;
                Ok(())
            },
            no_recovery,
        )
    }

    fn activate_group(&self, facet_name: &str) -> Result<()> {
        let contract = self.ctx.contract();
        let locator = self.ctx.locator();

        for group in locator.locate_all(&contract.facet_group)? {
            let title = match locator.locate_within(&group, &contract.facet_title) {
                Ok(title) => title,
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let label = self.ctx.driver.text(&title)?;
            if labels_match(&label, facet_name) {
                info!("opening facet '{}'", label.trim());
                return self.ctx.driver.click(&group);
            }
        }
        Err(Error::NotFound(format!("facet group '{}'", facet_name)))
    }

    /// Type `query` into the open group's filter field and wait for the list to settle.
    pub fn search(&self, query: &str) -> Result<()> {
        let contract = self.ctx.contract();
        let locator = self.ctx.locator();

        let field = locator.wait_visible_by(&contract.facet_search)?;
        locator.wait_clickable(&field)?;
        self.ctx.driver.type_text(&field, query)?;
        let typed = self.ctx.driver.attribute(&field, "value")?.unwrap_or_default();
        debug!("search field contains: {}", typed);

        locator.wait_any_clickable(&contract.facet_option_checkbox)?;
        Ok(())
    }

    /// Tick the option whose label (without its count) equals `value`.
    pub fn select(&self, value: &str, budget: &mut RetryBudget) -> Result<()> {
        with_retry_when(
            budget,
            &format!("select facet option '{}'", value),
            Error::is_stale,
            || self.click_matching_option(value),
            no_recovery,
        )
    }

    fn click_matching_option(&self, value: &str) -> Result<()> {
        let contract = self.ctx.contract();
        let locator = self.ctx.locator();

        for option in locator.locate_all(&contract.facet_option)? {
            let label = match locator.locate_within(&option, &contract.facet_option_label) {
                Ok(label) => label,
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let text = self.ctx.driver.text(&label)?;
            if option_matches(&text, value) {
                let checkbox = locator.locate_within(&option, &contract.facet_option_checkbox)?;
                info!("selecting option '{}'", text.trim());
                return self.ctx.driver.click(&checkbox);
            }
        }
        Err(Error::NotFound(format!("facet option '{}'", value)))
    }

    /// Close the open dropdown. Failures are logged and ignored.
    pub fn close(&self) {
        if let Err(e) = self.try_close() {
            warn!("close button: {} (ignoring and continuing)", e);
        }
    }

    fn try_close(&self) -> Result<()> {
        let contract = self.ctx.contract();
        let locator = self.ctx.locator();

        let button = locator.locate(&contract.facet_close)?;
        self.ctx.driver.scroll_into_view(&button)?;
        locator.wait_visible(&button)?;
        locator.wait_text_contains(&button, &contract.close_label)?;
        locator.wait_clickable(&button)?;
        self.ctx.driver.click(&button)
    }
}
