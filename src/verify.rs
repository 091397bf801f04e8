//! Pure comparison of requested facets against what the page shows.
//!
//! Nothing here touches the live session: the tile has already been read into a
//! [`ProductRecord`] and the detail page into a [`DetailDocument`], and the
//! functions below reconcile the two snapshots into per-axis results.

use crate::cases::{FacetAxis, FacetRequest};
use crate::detail::DetailDocument;
use crate::results::ProductRecord;
use serde::Serialize;

/// Outcome of one assertion on one axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub axis: FacetAxis,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    /// Where the actual value came from (a detail URL, or the facet summary)
    pub context: String,
}

impl VerificationResult {
    fn new(axis: FacetAxis, expected: &str, actual: impl Into<String>, passed: bool, context: &str) -> Self {
        Self {
            axis,
            expected: expected.to_string(),
            actual: actual.into(),
            passed,
            context: context.to_string(),
        }
    }
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.passed { "ok" } else { "mismatch" };
        write!(
            f,
            "{:?} {} - expected '{}', got '{}' ({})",
            self.axis, status, self.expected, self.actual, self.context
        )
    }
}

/// Strip a trailing result count: `"Chanel (12)"` becomes `"Chanel"`.
///
/// Only an all-digit suffix is a count; `"Chanel (Limited)"` stays as is.
pub fn normalize_option_label(label: &str) -> &str {
    let trimmed = label.trim();
    if let Some(rest) = trimmed.strip_suffix(')') {
        if let Some(open) = rest.rfind('(') {
            let count = &rest[open + 1..];
            if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) {
                return rest[..open].trim_end();
            }
        }
    }
    trimmed
}

/// Case-insensitive equality of two labels, ignoring surrounding whitespace.
pub fn labels_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Whether a dropdown option label names the requested value.
pub fn option_matches(option_label: &str, requested: &str) -> bool {
    labels_match(normalize_option_label(option_label), requested)
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

/// Every requested value must appear in the selected-facets summary.
pub fn assert_facets_applied(requests: &[FacetRequest], summary: &str) -> Vec<VerificationResult> {
    requests
        .iter()
        .filter(|r| !r.is_empty())
        .map(|r| {
            VerificationResult::new(
                r.axis(),
                r.value(),
                summary,
                contains_ignore_case(summary, r.value()),
                "selected facets",
            )
        })
        .collect()
}

/// Check one in-stock product against every requested axis.
///
/// Axes with an empty request are skipped; the audience axis and highlights
/// other than Limitiert, Sale and Neu have no per-product check.
pub fn assert_product_matches(
    record: &ProductRecord,
    requests: &[FacetRequest],
    detail: &DetailDocument,
) -> Vec<VerificationResult> {
    let context = detail.url();
    requests
        .iter()
        .filter(|r| !r.is_empty())
        .filter_map(|r| match r.axis() {
            FacetAxis::Category => Some(VerificationResult::new(
                r.axis(),
                r.value(),
                record.category.as_str(),
                labels_match(&record.category, r.value()),
                context,
            )),
            FacetAxis::Brand => Some(VerificationResult::new(
                r.axis(),
                r.value(),
                record.brand.as_str(),
                labels_match(&record.brand, r.value()),
                context,
            )),
            FacetAxis::Highlight => check_highlight(record, r.value(), detail),
            FacetAxis::GiftOccasion => {
                let actual = detail.gift_occasion();
                Some(VerificationResult::new(
                    r.axis(),
                    r.value(),
                    actual.unwrap_or("not found"),
                    actual.is_some_and(|a| contains_ignore_case(a, r.value())),
                    context,
                ))
            }
            FacetAxis::Audience => None,
        })
        .collect()
}

fn check_highlight(record: &ProductRecord, expected: &str, detail: &DetailDocument) -> Option<VerificationResult> {
    let context = detail.url();
    let tile_badges = record.highlight_badges.iter().cloned().collect::<Vec<_>>().join(" ");

    match expected.trim().to_lowercase().as_str() {
        "limitiert" => Some(VerificationResult::new(
            FacetAxis::Highlight,
            expected,
            detail.badge_text(),
            contains_ignore_case(detail.badge_text(), expected),
            context,
        )),
        // Promotional copy varies ("-19% ZUM UVP."), so only the marker counts.
        "sale" => Some(VerificationResult::new(
            FacetAxis::Highlight,
            expected,
            tile_badges,
            record.sale_marker,
            context,
        )),
        "neu" => Some(VerificationResult::new(
            FacetAxis::Highlight,
            expected,
            tile_badges,
            record.new_marker,
            context,
        )),
        _ => None,
    }
}
