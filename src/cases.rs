//! Test-case input and the facet requests derived from it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One filterable axis of the listing page, in the order facets are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FacetAxis {
    /// "Produktart"
    Category,
    /// "Marke"
    Brand,
    /// "Highlights"
    Highlight,
    /// "Geschenk für"
    GiftOccasion,
    /// "Für Wen"
    Audience,
}

impl FacetAxis {
    pub const ALL: [FacetAxis; 5] = [
        FacetAxis::Category,
        FacetAxis::Brand,
        FacetAxis::Highlight,
        FacetAxis::GiftOccasion,
        FacetAxis::Audience,
    ];

    /// Label of the facet group on the listing page.
    pub fn facet_label(self) -> &'static str {
        match self {
            FacetAxis::Category => "Produktart",
            FacetAxis::Brand => "Marke",
            FacetAxis::Highlight => "Highlights",
            FacetAxis::GiftOccasion => "Geschenk für",
            FacetAxis::Audience => "Für Wen",
        }
    }

    /// Whether the dropdown for this axis has to be narrowed by typing first.
    pub fn requires_search(self) -> bool {
        matches!(self, FacetAxis::Category | FacetAxis::Brand | FacetAxis::GiftOccasion)
    }
}

/// A single facet to apply. An empty value means the axis is not under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetRequest {
    axis: FacetAxis,
    name: String,
    value: String,
    requires_search: bool,
}

impl FacetRequest {
    pub fn new(axis: FacetAxis, value: impl Into<String>) -> Self {
        Self {
            axis,
            name: axis.facet_label().to_string(),
            value: value.into().trim().to_string(),
            requires_search: axis.requires_search(),
        }
    }

    pub fn axis(&self) -> FacetAxis {
        self.axis
    }

    /// Facet group label
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn requires_search(&self) -> bool {
        self.requires_search
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// One row of test input: five facet values, any of which may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestCase {
    pub id: String,
    pub category: String,
    pub brand: String,
    pub highlight: String,
    pub gift_occasion: String,
    pub audience: String,
}

impl TestCase {
    pub fn value(&self, axis: FacetAxis) -> &str {
        match axis {
            FacetAxis::Category => &self.category,
            FacetAxis::Brand => &self.brand,
            FacetAxis::Highlight => &self.highlight,
            FacetAxis::GiftOccasion => &self.gift_occasion,
            FacetAxis::Audience => &self.audience,
        }
    }

    /// All five requests in application order.
    pub fn facet_requests(&self) -> Vec<FacetRequest> {
        FacetAxis::ALL
            .iter()
            .map(|&axis| FacetRequest::new(axis, self.value(axis)))
            .collect()
    }

    /// Identity used by the cross-invocation retry ledger.
    pub fn ledger_key(&self) -> String {
        format!(
            "product_filters[{}]{}|{}|{}|{}|{}",
            self.id, self.category, self.brand, self.highlight, self.gift_occasion, self.audience
        )
    }
}

/// Read a JSON array of test cases; rows without an id are numbered from 1.
pub fn load_cases(path: impl AsRef<Path>) -> Result<Vec<TestCase>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    parse_cases(&raw).map_err(|e| match e {
        Error::ConfigError(msg) => Error::ConfigError(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

pub fn parse_cases(raw: &str) -> Result<Vec<TestCase>> {
    let mut cases: Vec<TestCase> = serde_json::from_str(raw).map_err(|e| Error::ConfigError(e.to_string()))?;
    for (idx, case) in cases.iter_mut().enumerate() {
        if case.id.trim().is_empty() {
            case.id = (idx + 1).to_string();
        }
    }
    Ok(cases)
}
