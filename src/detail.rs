//! Product detail pages, fetched without the interactive session.
//!
//! A detail page is never interacted with, only read, so it is retrieved with
//! a plain HTTP GET and parsed as static markup. The parse happens once; the
//! resulting [`DetailDocument`] only keeps the handful of values the verifier
//! reads.

use crate::retry::RetryBudget;
use crate::{Error, PageContract, ProbeConfig, Result};
use log::{debug, warn};
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

/// Immutable snapshot of a product detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailDocument {
    url: String,
    gift_occasion: Option<String>,
    badge_text: String,
    stock_label: Option<String>,
}

impl DetailDocument {
    /// Parse `body`; an empty body is a fetch failure, never an empty product.
    pub fn parse(url: &str, body: &str, contract: &PageContract) -> Result<Self> {
        if body.trim().is_empty() {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: "empty document".into(),
            });
        }

        let document = Html::parse_document(body);
        let gift_occasion = classification(&document, &contract.detail_classification, &contract.detail_gift_label)?;
        let badge_text = joined_text(&document, &contract.detail_badges)?;
        let stock_label = document
            .select(&selector(&contract.detail_stock_label)?)
            .next()
            .map(|el| collapse(&el))
            .filter(|s| !s.is_empty());

        Ok(Self {
            url: url.to_string(),
            gift_occasion,
            badge_text,
            stock_label,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Value of the gift-occasion classification row, if the page has one.
    pub fn gift_occasion(&self) -> Option<&str> {
        self.gift_occasion.as_deref()
    }

    /// Text of every badge on the page, space separated.
    pub fn badge_text(&self) -> &str {
        &self.badge_text
    }

    pub fn stock_label(&self) -> Option<&str> {
        self.stock_label.as_deref()
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("invalid selector '{}': {:?}", css, e)))
}

fn collapse(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn joined_text(document: &Html, css: &str) -> Result<String> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .map(|el| collapse(&el))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" "))
}

/// First `region` row whose leading span reads `label`; yields its second span.
fn classification(document: &Html, region: &str, label: &str) -> Result<Option<String>> {
    let rows = selector(region)?;
    let key = selector("span:nth-child(1)")?;
    let value = selector("span:nth-child(2)")?;

    for row in document.select(&rows) {
        let matches = row
            .select(&key)
            .next()
            .is_some_and(|span| crate::verify::labels_match(&collapse(&span), label));
        if matches {
            return Ok(Some(row.select(&value).next().map(|span| collapse(&span)).unwrap_or_default()));
        }
    }
    Ok(None)
}

/// Where detail documents come from.
pub trait DetailSource {
    fn fetch(&self, url: &str) -> Result<DetailDocument>;
}

/// Blocking HTTP fetcher for detail documents.
///
/// Network errors and non-success statuses are retried `fetch_retries` times;
/// an empty body is returned as [`Error::Fetch`] straight away.
pub struct DetailFetcher {
    client: Client,
    contract: PageContract,
    retries: u32,
}

impl DetailFetcher {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            contract: config.contract.clone(),
            retries: config.fetch_retries,
        })
    }

    fn get(&self, url: &str) -> std::result::Result<String, reqwest::Error> {
        self.client.get(url).send()?.error_for_status()?.text()
    }
}

impl DetailSource for DetailFetcher {
    fn fetch(&self, url: &str) -> Result<DetailDocument> {
        let mut budget = RetryBudget::new(self.retries);
        loop {
            match self.get(url) {
                Ok(body) => {
                    debug!("fetched {} ({} bytes)", url, body.len());
                    return DetailDocument::parse(url, &body, &self.contract);
                }
                Err(e) if budget.consume() => {
                    warn!("fetch {}: {} (retrying, {} retries left)", url, e, budget.remaining());
                }
                Err(e) => {
                    return Err(Error::Fetch {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}
