//! Output size budgeting.
//!
//! Firehose caps the size of a transformation response. When the transformed
//! records would exceed it, records are demoted from `Ok` to `Dropped`,
//! starting with the first record of the batch, and their original payloads
//! are queued for re-ingestion into the source stream.

use std::mem;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::decode::decode_base64;
use crate::destination::StreamKind;
use crate::types::{InboundRecord, RecordResult, ReingestionRecord, ResultStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLimits {
    pub max_output_bytes: usize,
    pub batch_size: usize,
}

impl From<&Config> for BudgetLimits {
    fn from(cfg: &Config) -> Self {
        Self {
            max_output_bytes: cfg.max_output_bytes,
            batch_size: cfg.reingest_batch_size,
        }
    }
}

#[derive(Debug)]
pub struct Selection {
    /// Results in input order, with demoted records marked `Dropped`.
    pub results: Vec<RecordResult>,
    /// Re-ingestion batches, each at most `batch_size` entries.
    pub batches: Vec<Vec<ReingestionRecord>>,
    /// Input indices of demoted records, ascending.
    pub demoted: Vec<usize>,
}

impl Selection {
    pub fn demoted_count(&self) -> usize {
        self.demoted.len()
    }
}

/// Sum of record id and payload lengths over `Ok` results.
pub fn projected_size(results: &[RecordResult]) -> usize {
    results.iter().map(RecordResult::projected_size).sum()
}

/// Demote `Ok` results in ascending index order until the projected
/// response fits within `limits.max_output_bytes`.
///
/// `originals` must be the inbound records in the same order as `results`.
pub fn select_for_reingestion(
    mut results: Vec<RecordResult>,
    originals: &[InboundRecord],
    kind: StreamKind,
    limits: BudgetLimits,
) -> Result<Selection> {
    if results.len() != originals.len() {
        anyhow::bail!(
            "result count {} does not match record count {}",
            results.len(),
            originals.len()
        );
    }
    let batch_size = limits.batch_size.max(1);

    let mut projected = projected_size(&results);
    let mut pending: Vec<ReingestionRecord> = Vec::new();
    let mut batches = Vec::new();
    let mut demoted = Vec::new();

    for (idx, result) in results.iter_mut().enumerate() {
        if projected <= limits.max_output_bytes {
            break;
        }
        if !result.is_ok() {
            continue;
        }

        pending.push(reingestion_record(kind, &originals[idx])?);
        let freed = result.data.take().map(|d| d.len()).unwrap_or(0);
        projected = projected.saturating_sub(freed);
        result.result = ResultStatus::Dropped;
        demoted.push(idx);

        if pending.len() == batch_size {
            batches.push(mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        batches.push(pending);
    }

    Ok(Selection {
        results,
        batches,
        demoted,
    })
}

/// Rebuild the pre-transform payload of an inbound record for resubmission.
pub fn reingestion_record(kind: StreamKind, original: &InboundRecord) -> Result<ReingestionRecord> {
    let data = decode_base64(&original.data)
        .with_context(|| format!("decoding original data of record {}", original.record_id))?;
    let partition_key = match kind {
        StreamKind::Kinesis => Some(
            original
                .partition_key()
                .with_context(|| {
                    format!(
                        "record {} from a kinesis source has no partition key",
                        original.record_id
                    )
                })?
                .to_string(),
        ),
        StreamKind::Firehose => None,
    };
    Ok(ReingestionRecord {
        data,
        partition_key,
    })
}
