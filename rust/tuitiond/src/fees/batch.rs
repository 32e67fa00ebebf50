use crate::fees::FeeResult;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport<T> {
    pub processed: usize,
    pub skipped: usize,
    pub results: Vec<T>,
    pub failures: Vec<BatchFailure>,
}

impl<T> BatchReport<T> {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }
}

/// Drains `items` one at a time. Each item gets its own error boundary: a
/// failure is recorded and the queue moves on. `Ok(None)` counts as skipped.
pub fn run_queue<I, T, K, F>(name: &str, items: I, key: K, mut work: F) -> BatchReport<T>
where
    I: IntoIterator,
    K: Fn(&I::Item) -> String,
    F: FnMut(&I::Item) -> FeeResult<Option<T>>,
{
    let mut queue: VecDeque<I::Item> = items.into_iter().collect();
    let mut report = BatchReport {
        processed: 0,
        skipped: 0,
        results: Vec::new(),
        failures: Vec::new(),
    };
    while let Some(item) = queue.pop_front() {
        report.processed += 1;
        match work(&item) {
            Ok(Some(result)) => report.results.push(result),
            Ok(None) => report.skipped += 1,
            Err(e) => {
                let key = key(&item);
                warn!(batch = name, key = %key, error = %e, "batch item failed");
                report.failures.push(BatchFailure {
                    key,
                    error: e.to_string(),
                });
            }
        }
    }
    info!(
        batch = name,
        processed = report.processed,
        succeeded = report.succeeded(),
        skipped = report.skipped,
        failed = report.failures.len(),
        "batch finished"
    );
    report
}
