//! Where verdicts and failure artifacts go.

use crate::runner::CaseVerdict;
use crate::{Error, Result};
use log::{error, info};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Mutex;

/// Receives the final verdict of every test case.
pub trait ReportSink: Send + Sync {
    fn record(&self, verdict: &CaseVerdict);
}

/// Writes verdicts to the log facade.
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn record(&self, verdict: &CaseVerdict) {
        if verdict.passed {
            info!(
                "case {} passed (attempt {}, {} products)",
                verdict.case_id,
                verdict.attempt,
                verdict.products.len()
            );
            return;
        }

        if let Some(fatal) = &verdict.fatal {
            error!("case {} failed: {}", verdict.case_id, fatal);
        }
        for check in verdict.applied_facets.iter().filter(|c| !c.passed) {
            error!("case {}: {}", verdict.case_id, check);
        }
        for product in verdict.products.iter().filter(|p| !p.passed()) {
            error!("case {}: product {} ({}) failed: {:?}", verdict.case_id, product.index, product.name, product.outcome);
        }
        if let Some(path) = &verdict.screenshot {
            error!("case {}: screenshot at {}", verdict.case_id, path.display());
        }
    }
}

/// Keeps verdicts in memory in arrival order.
#[derive(Default)]
pub struct MemoryReportSink {
    verdicts: Mutex<Vec<CaseVerdict>>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdicts(&self) -> Vec<CaseVerdict> {
        match self.verdicts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ReportSink for MemoryReportSink {
    fn record(&self, verdict: &CaseVerdict) {
        let mut guard = match self.verdicts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(verdict.clone());
    }
}

/// Persists diagnostic artifacts captured on fatal failures.
pub trait ArtifactStore: Send + Sync {
    fn store_screenshot(&self, name: &str, png: &[u8]) -> Result<PathBuf>;
}

/// Stores artifacts as files under one directory.
pub struct DirArtifactStore {
    dir: PathBuf,
}

impl DirArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactStore for DirArtifactStore {
    fn store_screenshot(&self, name: &str, png: &[u8]) -> Result<PathBuf> {
        if png.is_empty() {
            return Err(Error::Other("refusing to store an empty screenshot".into()));
        }
        std::fs::create_dir_all(&self.dir)?;

        let digest = hex::encode(Sha256::digest(png));
        let path = self.dir.join(format!("{}-{}.png", sanitize(name), &digest[..12]));
        std::fs::write(&path, png)?;
        Ok(path)
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}
