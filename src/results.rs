//! Reading product tiles off the listing page.

use crate::retry::{no_recovery, with_retry_when, RetryBudget};
use crate::{ElementHandle, Error, PageContext, PageDriver, Result};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeSet;

/// Read-only view of one rendered result tile.
///
/// Records are never cached: a reload may replace every tile, so callers
/// enumerate again instead of reusing old records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductRecord {
    /// Position in the result list, starting at 0
    pub index: usize,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub highlight_badges: BTreeSet<String>,
    /// Distinct discount marker, independent of the badge copy
    pub sale_marker: bool,
    pub new_marker: bool,
    pub in_stock: bool,
    pub detail_link: Option<String>,
}

pub struct ResultCollector<'a, D: PageDriver + ?Sized> {
    ctx: PageContext<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> ResultCollector<'a, D> {
    pub fn new(ctx: PageContext<'a, D>) -> Self {
        Self { ctx }
    }

    /// Handles for every displayed tile.
    ///
    /// Fails with [`Error::WaitTimeout`] when no tile renders in time; a
    /// listing that never appeared is not an empty result.
    pub fn tiles(&self) -> Result<Vec<ElementHandle>> {
        let locator = self.ctx.locator();
        let selector = &self.ctx.contract().product_tile;
        locator.wait_present(selector)?;
        locator.locate_all(selector)
    }

    /// One record per displayed tile, enumerated afresh.
    ///
    /// A tile replaced mid-scan restarts the whole enumeration.
    pub fn list_products(&self, budget: &mut RetryBudget) -> Result<Vec<ProductRecord>> {
        with_retry_when(
            budget,
            "list products",
            Error::is_stale,
            || {
                self.tiles()?
                    .iter()
                    .enumerate()
                    .map(|(index, tile)| self.read_record(index, tile))
                    .collect()
            },
            no_recovery,
        )
    }

    fn read_record(&self, index: usize, tile: &ElementHandle) -> Result<ProductRecord> {
        let contract = self.ctx.contract();
        let driver = self.ctx.driver;

        // Badges render lazily once the tile has been in view.
        if let Err(e) = driver.scroll_into_view(tile).and_then(|_| driver.hover(tile)) {
            if e.is_stale() {
                return Err(e);
            }
            debug!("tile {}: could not bring into view: {}", index, e);
        }

        let mut highlight_badges = BTreeSet::new();
        for badge in self.ctx.locator().locate_all_within(tile, &contract.tile_badges)? {
            let text = driver.text(&badge)?.trim().to_string();
            if !text.is_empty() {
                highlight_badges.insert(text);
            }
        }

        let name = self.optional_text(tile, &contract.tile_name)?;
        let brand = self.optional_text(tile, &contract.tile_brand)?;
        let category = self.optional_text(tile, &contract.tile_category)?;
        let sale_marker = self.has_marker(tile, &contract.tile_sale_marker)?;
        let new_marker = self.has_marker(tile, &contract.tile_new_marker)?;
        let detail_link = self.detail_link(tile, &mut self.ctx.budget())?;
        let in_stock = !self.is_out_of_stock(tile)?;

        Ok(ProductRecord {
            index,
            name,
            brand,
            category,
            highlight_badges,
            sale_marker,
            new_marker,
            in_stock,
            detail_link,
        })
    }

    fn optional_text(&self, tile: &ElementHandle, selector: &str) -> Result<String> {
        match self.ctx.locator().locate_within(tile, selector) {
            Ok(el) => Ok(self.ctx.driver.text(&el)?.trim().to_string()),
            Err(Error::NotFound(_)) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    fn has_marker(&self, tile: &ElementHandle, selector: &str) -> Result<bool> {
        for marker in self.ctx.locator().locate_all_within(tile, selector)? {
            if self.ctx.driver.is_displayed(&marker)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Absolute link to the product's detail page.
    ///
    /// A link node that keeps going stale yields `None` once the budget is
    /// spent. A stale tile is returned as [`Error::Stale`] so the caller can
    /// enumerate again.
    pub fn detail_link(&self, tile: &ElementHandle, budget: &mut RetryBudget) -> Result<Option<String>> {
        let href = with_retry_when(
            budget,
            "read detail link",
            Error::is_stale,
            || {
                let link = match self.ctx.locator().locate_within(tile, &self.ctx.contract().tile_link) {
                    Ok(link) => link,
                    // Scope failures belong to the tile, not to the link.
                    Err(e) => return Ok(Err(e)),
                };
                self.ctx.driver.attribute(&link, "href").map(Ok)
            },
            no_recovery,
        );

        let href = match href {
            Ok(Ok(Some(href))) if !href.trim().is_empty() => href,
            Ok(Ok(_)) | Ok(Err(Error::NotFound(_))) => return Ok(None),
            Ok(Err(e)) => return Err(e),
            Err(e) => {
                warn!("no detail link for tile: {}", e);
                return Ok(None);
            }
        };

        let resolved = match self.ctx.driver.current_url().map(|base| url::Url::parse(&base)) {
            Ok(Ok(base)) => base.join(href.trim()).ok().map(String::from),
            _ => url::Url::parse(href.trim()).ok().map(String::from),
        };
        Ok(resolved)
    }

    /// Best effort: a failed marker lookup counts as in stock. Only a stale
    /// tile is reported, since the tile has to be read again anyway.
    pub fn is_out_of_stock(&self, tile: &ElementHandle) -> Result<bool> {
        match self.has_marker(tile, &self.ctx.contract().tile_out_of_stock) {
            Ok(out_of_stock) => Ok(out_of_stock),
            Err(e) if e.is_stale() => Err(e),
            Err(e) => {
                debug!("stock marker lookup failed, assuming in stock: {}", e);
                Ok(false)
            }
        }
    }
}
