//! Session entry: consent overlay and the way to the listing page.

use crate::retry::{with_retry, RetryBudget};
use crate::{PageContext, PageDriver, Result};
use log::info;

pub struct SessionNavigator<'a, D: PageDriver + ?Sized> {
    ctx: PageContext<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> SessionNavigator<'a, D> {
    pub fn new(ctx: PageContext<'a, D>) -> Self {
        Self { ctx }
    }

    /// Open `url` and dismiss the consent overlay, reloading between attempts.
    ///
    /// The overlay is the step most likely to fail when the site throttles a
    /// session; exhaustion is reported as a blocked session.
    pub fn enter(&self, url: &str, budget: &mut RetryBudget) -> Result<()> {
        self.ctx.driver.navigate(url)?;

        with_retry(
            budget,
            "consent overlay not found (likely blocked)",
            || self.dismiss_consent(),
            || self.ctx.reload(),
        )?;

        // A dismissed overlay still swallows the next navigation click on some engines.
        self.ctx.reload()
    }

    fn dismiss_consent(&self) -> Result<()> {
        let contract = self.ctx.contract();
        let locator = self.ctx.locator();

        locator.wait_visible_by(&contract.consent_overlay)?;
        let accept = locator.locate(&contract.consent_accept)?;
        self.ctx.driver.click(&accept)?;
        info!("consent overlay dismissed");
        Ok(())
    }

    /// Follow the primary navigation entry to the listing page.
    pub fn goto_listing(&self, budget: &mut RetryBudget) -> Result<()> {
        with_retry(budget, "open listing page", || self.open_listing(), || self.ctx.reload())
    }

    fn open_listing(&self) -> Result<()> {
        let contract = self.ctx.contract();
        let locator = self.ctx.locator();

        let entry = locator.wait_any_clickable(&contract.listing_entry)?;
        self.ctx.driver.hover(&entry)?;
        self.ctx.driver.click(&entry)?;

        // Park the cursor so the hover menu does not cover the facet bar.
        let header = locator.locate(&contract.header)?;
        self.ctx.driver.hover(&header)
    }
}
