//! Element lookup and bounded waits over a [`PageDriver`].
//!
//! Waits poll their condition until it holds or the timeout elapses. A
//! transient failure inside the condition (the node is missing, or was just
//! replaced) counts as "not yet"; anything else ends the wait immediately.

use crate::{ElementHandle, Error, PageDriver, Result};
use log::debug;
use std::time::{Duration, Instant};

pub struct Locator<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    timeout: Duration,
    poll: Duration,
}

impl<'a, D: PageDriver + ?Sized> Locator<'a, D> {
    pub fn new(driver: &'a D, timeout: Duration, poll: Duration) -> Self {
        Self { driver, timeout, poll }
    }

    /// Same locator with a different wait timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            driver: self.driver,
            timeout,
            poll: self.poll,
        }
    }

    /// First node matching `selector`.
    pub fn locate(&self, selector: &str) -> Result<ElementHandle> {
        self.first(None, selector)
    }

    /// First node matching `selector` inside `scope`.
    pub fn locate_within(&self, scope: &ElementHandle, selector: &str) -> Result<ElementHandle> {
        self.first(Some(scope), selector)
    }

    pub fn locate_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        self.driver.query_all(None, selector)
    }

    pub fn locate_all_within(&self, scope: &ElementHandle, selector: &str) -> Result<Vec<ElementHandle>> {
        self.driver.query_all(Some(scope), selector)
    }

    fn first(&self, scope: Option<&ElementHandle>, selector: &str) -> Result<ElementHandle> {
        self.driver
            .query_all(scope, selector)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(selector.to_string()))
    }

    /// Block until `condition` returns true or the timeout elapses.
    pub fn wait_until<F>(&self, what: &str, mut condition: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let start = Instant::now();
        loop {
            match condition() {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_transient() => debug!("waiting for {}: {}", what, e),
                Err(e) => return Err(e),
            }

            if start.elapsed() >= self.timeout {
                return Err(Error::WaitTimeout {
                    what: what.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            std::thread::sleep(self.poll);
        }
    }

    /// Wait until at least `min + 1` nodes match `selector`.
    pub fn wait_for_count_above(&self, selector: &str, min: usize) -> Result<()> {
        self.wait_until(&format!("more than {} of {}", min, selector), || {
            Ok(self.driver.query_all(None, selector)?.len() > min)
        })
    }

    pub fn wait_present(&self, selector: &str) -> Result<()> {
        self.wait_for_count_above(selector, 0)
    }

    pub fn wait_visible(&self, element: &ElementHandle) -> Result<()> {
        self.wait_until(&format!("{} to be visible", element.selector), || {
            self.driver.is_displayed(element)
        })
    }

    /// Locate `selector` afresh on every poll and wait until it is visible.
    pub fn wait_visible_by(&self, selector: &str) -> Result<ElementHandle> {
        let mut found = None;
        self.wait_until(&format!("{} to be visible", selector), || {
            let element = self.locate(selector)?;
            let visible = self.driver.is_displayed(&element)?;
            if visible {
                found = Some(element);
            }
            Ok(visible)
        })?;
        found.ok_or_else(|| Error::NotFound(selector.to_string()))
    }

    pub fn wait_clickable(&self, element: &ElementHandle) -> Result<()> {
        self.wait_until(&format!("{} to be clickable", element.selector), || {
            self.is_clickable(element)
        })
    }

    /// Wait until some node matching `selector` is visible and enabled.
    pub fn wait_any_clickable(&self, selector: &str) -> Result<ElementHandle> {
        let mut found = None;
        self.wait_until(&format!("any {} to be clickable", selector), || {
            for element in self.driver.query_all(None, selector)? {
                if self.is_clickable(&element)? {
                    found = Some(element);
                    return Ok(true);
                }
            }
            Ok(false)
        })?;
        found.ok_or_else(|| Error::NotFound(selector.to_string()))
    }

    /// Wait until the node's text contains `expected` (case-sensitive, as rendered).
    pub fn wait_text_contains(&self, element: &ElementHandle, expected: &str) -> Result<()> {
        self.wait_until(&format!("{} to read '{}'", element.selector, expected), || {
            Ok(self.driver.text(element)?.contains(expected))
        })
    }

    fn is_clickable(&self, element: &ElementHandle) -> Result<bool> {
        Ok(self.driver.is_displayed(element)? && self.driver.is_enabled(element)?)
    }
}
