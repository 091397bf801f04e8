//! Runs many test cases, each on its own worker thread and session.
//!
//! Cases run concurrently up to `parallelism`; nothing mutable is shared
//! between them except the [`RetryLedger`]. A session is owned by the worker
//! thread that created it and never crosses threads, so drivers need not be
//! `Send`.

use crate::cases::TestCase;
use crate::detail::DetailSource;
use crate::report::{ArtifactStore, ReportSink};
use crate::runner::{CaseRunner, CaseVerdict};
use crate::{Error, PageContext, PageDriver, ProbeConfig, Result};
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

/// Creates the per-case collaborators on the worker thread.
pub trait SessionFactory: Send + Sync + 'static {
    type Driver: PageDriver;
    type Details: DetailSource;

    fn open_session(&self, config: &ProbeConfig) -> Result<Self::Driver>;

    fn detail_source(&self, config: &ProbeConfig) -> Result<Self::Details>;
}

/// Keyed count of re-runs, safe for concurrent read and increment.
pub struct RetryLedger {
    max: u32,
    counts: Mutex<HashMap<String, u32>>,
}

impl RetryLedger {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Record a retry for `key` if it still has one left.
    pub fn should_retry(&self, key: &str) -> bool {
        let mut counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = counts.entry(key.to_string()).or_insert(0);
        if *count < self.max {
            *count += 1;
            true
        } else {
            false
        }
    }

    /// Retries granted to `key` so far.
    pub fn count(&self, key: &str) -> u32 {
        let counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counts.get(key).copied().unwrap_or(0)
    }
}

pub struct Suite<F: SessionFactory> {
    factory: Arc<F>,
    config: Arc<ProbeConfig>,
    ledger: Arc<RetryLedger>,
    sink: Arc<dyn ReportSink>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
}

impl<F: SessionFactory> Suite<F> {
    pub fn new(factory: F, config: ProbeConfig, sink: Arc<dyn ReportSink>) -> Self {
        let ledger = RetryLedger::new(config.case_retries);
        Self {
            factory: Arc::new(factory),
            config: Arc::new(config),
            ledger: Arc::new(ledger),
            sink,
            artifacts: None,
        }
    }

    pub fn with_artifacts(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    /// Run every case; verdicts come back in input order.
    pub async fn run(&self, cases: Vec<TestCase>) -> Vec<CaseVerdict> {
        let parallelism = self.config.parallelism.max(1);
        info!("running {} cases, {} at a time", cases.len(), parallelism);

        stream::iter(cases.into_iter().map(|case| self.run_case(case)))
            .buffered(parallelism)
            .collect()
            .await
    }

    async fn run_case(&self, case: TestCase) -> CaseVerdict {
        let key = case.ledger_key();
        let mut attempt = 1;
        loop {
            let verdict = self.spawn_attempt(case.clone(), attempt).await;
            if verdict.passed || !self.ledger.should_retry(&key) {
                self.sink.record(&verdict);
                return verdict;
            }
            warn!("case {} failed on attempt {}, re-running", case.id, attempt);
            attempt += 1;
        }
    }

    async fn spawn_attempt(&self, case: TestCase, attempt: u32) -> CaseVerdict {
        let (tx, rx) = oneshot::channel();
        let factory = Arc::clone(&self.factory);
        let config = Arc::clone(&self.config);
        let artifacts = self.artifacts.clone();
        let case_id = case.id.clone();

        thread::spawn(move || {
            let verdict = match run_on_worker(factory.as_ref(), &config, artifacts.as_deref(), &case, attempt) {
                Ok(verdict) => verdict,
                Err(e) => CaseVerdict::fatal(&case.id, attempt, e.to_string()),
            };
            let _ = tx.send(verdict);
        });

        match rx.await {
            Ok(verdict) => verdict,
            Err(e) => CaseVerdict::fatal(
                &case_id,
                attempt,
                Error::Other(format!("Worker canceled: {}", e)).to_string(),
            ),
        }
    }
}

fn run_on_worker<F: SessionFactory>(
    factory: &F,
    config: &ProbeConfig,
    artifacts: Option<&dyn ArtifactStore>,
    case: &TestCase,
    attempt: u32,
) -> Result<CaseVerdict> {
    let driver = factory.open_session(config)?;
    let details = factory.detail_source(config)?;
    let runner = CaseRunner::new(PageContext::new(&driver, config), &details, artifacts);
    Ok(runner.run_attempt(case, attempt))
}
