//! Re-ingestion of demoted records into their source stream.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::destination::StreamDestination;
use crate::types::ReingestionRecord;

/// Service error codes that no amount of retrying will fix.
const PERMANENT_ERROR_CODES: [&str; 11] = [
    "AccessDeniedException",
    "InvalidArgumentException",
    "InvalidSignatureException",
    "KMSAccessDeniedException",
    "KMSDisabledException",
    "KMSInvalidStateException",
    "KMSNotFoundException",
    "KMSOptInRequired",
    "ResourceNotFoundException",
    "UnrecognizedClientException",
    "ValidationException",
];

pub fn is_permanent_error_code(code: &str) -> bool {
    PERMANENT_ERROR_CODES.contains(&code)
}

/// A put call rejected for a reason retrying cannot fix.
/// Use anyhow's `downcast_ref::<PermanentPutError>()` to detect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermanentPutError {
    pub code: String,
    pub message: String,
}

impl fmt::Display for PermanentPutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PermanentPutError {}

/// An entry the stream rejected within an otherwise accepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub index: usize,
    pub error_code: String,
}

/// Per-entry result of one put call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    pub failed: Vec<FailedEntry>,
}

impl PutOutcome {
    pub fn accepted() -> Self {
        Self::default()
    }

    /// Build from the per-entry error codes of a put response, in request order.
    pub fn from_error_codes<'a>(codes: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let failed = codes
            .into_iter()
            .enumerate()
            .filter_map(|(index, code)| {
                code.map(|c| FailedEntry {
                    index,
                    error_code: c.to_string(),
                })
            })
            .collect();
        Self { failed }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write capability of a stream that accepts re-ingested records.
#[async_trait]
pub trait RecordStream: Send + Sync {
    fn name(&self) -> &str;

    /// Submit one batch. Whole-call failures are `Err`, wrapping a
    /// [`PermanentPutError`] when retrying is pointless; rejected entries
    /// are reported in the outcome.
    async fn put_records(&self, records: &[ReingestionRecord]) -> Result<PutOutcome>;
}

/// Builds a [`RecordStream`] for a destination.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, destination: &StreamDestination) -> Result<Arc<dyn RecordStream>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

impl From<&Config> for RetryPolicy {
    fn from(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.max_put_attempts,
            backoff_base: cfg.backoff_base(),
            backoff_max: cfg.backoff_max(),
        }
    }
}

/// Put one batch, retrying call errors and resubmitting only the entries a
/// partially failed call rejected. A [`PermanentPutError`] ends the loop
/// at once.
pub async fn put_with_retry(
    stream: &dyn RecordStream,
    records: Vec<ReingestionRecord>,
    policy: &RetryPolicy,
) -> Result<()> {
    let mut pending = records;
    let mut last_error = String::from("no attempts made");

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            sleep(policy.backoff(attempt)).await;
        }

        match stream.put_records(&pending).await {
            Ok(outcome) if outcome.is_complete() => return Ok(()),
            Ok(outcome) => {
                let codes: Vec<&str> = outcome
                    .failed
                    .iter()
                    .map(|f| f.error_code.as_str())
                    .collect();
                warn!(
                    stream = stream.name(),
                    attempt = attempt + 1,
                    failed = outcome.failed.len(),
                    submitted = pending.len(),
                    error_codes = ?codes,
                    "put records partially failed"
                );
                last_error = format!("error codes {codes:?}");
                let failed: HashSet<usize> = outcome.failed.iter().map(|f| f.index).collect();
                pending = pending
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| failed.contains(i))
                    .map(|(_, r)| r)
                    .collect();
            }
            Err(err) if err.downcast_ref::<PermanentPutError>().is_some() => {
                warn!(
                    stream = stream.name(),
                    attempt = attempt + 1,
                    "put records failed permanently: {err:#}"
                );
                return Err(err.context(format!("could not put records to {}", stream.name())));
            }
            Err(err) => {
                warn!(
                    stream = stream.name(),
                    attempt = attempt + 1,
                    "put records failed: {err:#}"
                );
                last_error = format!("{err:#}");
            }
        }
    }

    anyhow::bail!(
        "could not put records to {} after {} attempts: {}",
        stream.name(),
        policy.max_attempts,
        last_error
    )
}

/// Dispatch every batch concurrently and wait for all of them. Fails if any
/// batch exhausts its retries, regardless of how the others fared.
pub async fn reingest(
    batches: Vec<Vec<ReingestionRecord>>,
    stream: Arc<dyn RecordStream>,
    policy: &RetryPolicy,
    total_records: usize,
) -> Result<()> {
    let to_reingest: usize = batches.iter().map(Vec::len).sum();
    let batch_count = batches.len();

    let mut handles: FuturesUnordered<tokio::task::JoinHandle<Result<()>>> =
        FuturesUnordered::new();
    let mut queued = 0usize;

    for batch in batches {
        queued += batch.len();
        info!(
            total_records_reingested = queued,
            total_records_to_be_reingested = to_reingest,
            total_records,
            stream = stream.name(),
            "reingesting records"
        );
        let stream = stream.clone();
        let policy = policy.clone();
        handles.push(tokio::spawn(async move {
            put_with_retry(stream.as_ref(), batch, &policy).await
        }));
    }

    let mut failures = Vec::new();
    while let Some(result) = handles.next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failures.push(e),
            Err(e) => failures.push(anyhow::anyhow!("reingest task failed: {e}")),
        }
    }

    let failed_batches = failures.len();
    if let Some(first) = failures.into_iter().next() {
        return Err(first.context(format!(
            "{failed_batches} of {batch_count} reingest batches failed for {}",
            stream.name()
        )));
    }

    info!(
        total_records_to_be_reingested = to_reingest,
        total_records,
        stream = stream.name(),
        "reingesting records complete"
    );
    Ok(())
}
