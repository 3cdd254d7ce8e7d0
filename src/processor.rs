//! Per-invocation control flow: transform every record, fit the response
//! into the output budget, and push the overflow back to the source stream.

use std::sync::Arc;

use anyhow::Result;
use futures::future::try_join_all;
use tracing::info;

use crate::assemble::assemble;
use crate::budget::{select_for_reingestion, BudgetLimits};
use crate::classify::{classify, LogSource};
use crate::config::Config;
use crate::decode::{decode_record, Decoded};
use crate::destination::{StreamDestination, StreamKind};
use crate::reingest::{reingest, RetryPolicy, StreamConnector};
use crate::types::{BatchResult, FirehoseEvent, InboundRecord, NormalizedEvent, RecordResult};

pub struct Processor {
    cfg: Config,
    connector: Arc<dyn StreamConnector>,
}

impl Processor {
    pub fn new(cfg: Config, connector: Arc<dyn StreamConnector>) -> Self {
        Self { cfg, connector }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Handle one Firehose transformation invocation.
    ///
    /// The returned records correspond positionally to `event.records`. An
    /// error means the whole batch should be redelivered.
    pub async fn process(&self, event: FirehoseEvent) -> Result<BatchResult> {
        info!(
            records = event.records.len(),
            invocation_id = ?event.invocation_id,
            "processor received event"
        );

        let results = transform_records(&event.records, &self.cfg).await?;

        let kind = StreamKind::for_event(&event);
        let selection = select_for_reingestion(
            results,
            &event.records,
            kind,
            BudgetLimits::from(&self.cfg),
        )?;

        if selection.batches.is_empty() {
            info!("no records need to be reingested");
            return Ok(BatchResult {
                records: selection.results,
            });
        }

        let destination = StreamDestination::from_event(&event)?;
        info!(
            demoted = selection.demoted_count(),
            batches = selection.batches.len(),
            stream = %destination.arn().name,
            region = %destination.arn().region,
            "response exceeds output budget, reingesting overflow"
        );
        let stream = self.connector.connect(&destination).await?;
        reingest(
            selection.batches,
            stream,
            &RetryPolicy::from(&self.cfg),
            event.records.len(),
        )
        .await?;

        Ok(BatchResult {
            records: selection.results,
        })
    }
}

/// Transform all records concurrently, keeping input order.
pub async fn transform_records(records: &[InboundRecord], cfg: &Config) -> Result<Vec<RecordResult>> {
    try_join_all(
        records
            .iter()
            .map(|record| async move { transform_record(record, cfg) }),
    )
    .await
}

/// Decode, classify and assemble one record.
pub fn transform_record(record: &InboundRecord, cfg: &Config) -> Result<RecordResult> {
    let envelope = match decode_record(record)? {
        Decoded::Resolved(result) => return Ok(result),
        Decoded::Envelope(envelope) => envelope,
    };
    let Some((owner, log_group)) = envelope.origin() else {
        return Ok(RecordResult::processing_failed(&record.record_id));
    };
    let source = LogSource {
        owner,
        log_group,
        log_stream: envelope.log_stream.as_deref().unwrap_or_default(),
    };

    let events: Vec<NormalizedEvent> = envelope
        .log_events
        .iter()
        .map(|ev| classify(ev, &source, &cfg.sourcetype))
        .collect();
    assemble(&record.record_id, &events, &cfg.event_delimiter)
}
