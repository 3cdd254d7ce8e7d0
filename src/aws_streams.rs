//! Kinesis Data Streams and Firehose clients for re-ingestion.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{timeout::TimeoutConfig, BehaviorVersion};
use aws_sdk_kinesis::error::ProvideErrorMetadata;
use tracing::debug;

use crate::config::Config;
use crate::destination::StreamDestination;
use crate::reingest::{
    is_permanent_error_code, PermanentPutError, PutOutcome, RecordStream, StreamConnector,
};
use crate::types::ReingestionRecord;

pub struct KinesisStream {
    client: aws_sdk_kinesis::Client,
    stream_name: String,
}

impl KinesisStream {
    pub fn new(client: aws_sdk_kinesis::Client, stream_name: impl Into<String>) -> Self {
        Self {
            client,
            stream_name: stream_name.into(),
        }
    }
}

#[async_trait]
impl RecordStream for KinesisStream {
    fn name(&self) -> &str {
        &self.stream_name
    }

    async fn put_records(&self, records: &[ReingestionRecord]) -> Result<PutOutcome> {
        use aws_sdk_kinesis::primitives::Blob;
        use aws_sdk_kinesis::types::PutRecordsRequestEntry;

        let entries = records
            .iter()
            .map(|r| {
                let key = r
                    .partition_key
                    .as_deref()
                    .context("kinesis entry has no partition key")?;
                PutRecordsRequestEntry::builder()
                    .data(Blob::new(r.data.clone()))
                    .partition_key(key)
                    .build()
                    .context("building kinesis entry")
            })
            .collect::<Result<Vec<_>>>()?;

        let resp = self
            .client
            .put_records()
            .stream_name(&self.stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|err| put_error(err, "kinesis put_records"))?;

        debug!(
            stream = %self.stream_name,
            failed = resp.failed_record_count().unwrap_or(0),
            "kinesis put_records response"
        );
        Ok(PutOutcome::from_error_codes(
            resp.records().iter().map(|e| e.error_code()),
        ))
    }
}

pub struct FirehoseStream {
    client: aws_sdk_firehose::Client,
    stream_name: String,
}

impl FirehoseStream {
    pub fn new(client: aws_sdk_firehose::Client, stream_name: impl Into<String>) -> Self {
        Self {
            client,
            stream_name: stream_name.into(),
        }
    }
}

#[async_trait]
impl RecordStream for FirehoseStream {
    fn name(&self) -> &str {
        &self.stream_name
    }

    async fn put_records(&self, records: &[ReingestionRecord]) -> Result<PutOutcome> {
        use aws_sdk_firehose::primitives::Blob;
        use aws_sdk_firehose::types::Record;

        let entries = records
            .iter()
            .map(|r| {
                Record::builder()
                    .data(Blob::new(r.data.clone()))
                    .build()
                    .context("building firehose record")
            })
            .collect::<Result<Vec<_>>>()?;

        let resp = self
            .client
            .put_record_batch()
            .delivery_stream_name(&self.stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|err| put_error(err, "firehose put_record_batch"))?;

        debug!(
            stream = %self.stream_name,
            failed = resp.failed_put_count(),
            "firehose put_record_batch response"
        );
        Ok(PutOutcome::from_error_codes(
            resp.request_responses().iter().map(|e| e.error_code()),
        ))
    }
}

/// Wrap an SDK failure, marking codes that retrying cannot fix.
fn put_error<E>(err: E, operation: &'static str) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let permanent = err
        .code()
        .filter(|code| is_permanent_error_code(code))
        .map(str::to_string);
    match permanent {
        Some(code) => anyhow::Error::new(PermanentPutError {
            code,
            message: err.message().unwrap_or_default().to_string(),
        })
        .context(operation),
        None => anyhow::Error::new(err).context(operation),
    }
}

/// Connects to the destination's region with the default credential chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsStreamConnector {
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl AwsStreamConnector {
    pub fn new(connect_timeout: Duration, operation_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            operation_timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.connect_timeout(), cfg.http_timeout())
    }

    async fn sdk_config(&self, region: &str) -> aws_config::SdkConfig {
        let timeout_config = TimeoutConfig::builder()
            .connect_timeout(self.connect_timeout)
            .operation_timeout(self.operation_timeout)
            .build();

        aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_kinesis::config::Region::new(region.to_string()))
            .timeout_config(timeout_config)
            .load()
            .await
    }
}

#[async_trait]
impl StreamConnector for AwsStreamConnector {
    async fn connect(&self, destination: &StreamDestination) -> Result<Arc<dyn RecordStream>> {
        let arn = destination.arn();
        let sdk = self.sdk_config(&arn.region).await;
        let stream: Arc<dyn RecordStream> = match destination {
            StreamDestination::Kinesis(arn) => Arc::new(KinesisStream::new(
                aws_sdk_kinesis::Client::new(&sdk),
                arn.name.clone(),
            )),
            StreamDestination::Firehose(arn) => Arc::new(FirehoseStream::new(
                aws_sdk_firehose::Client::new(&sdk),
                arn.name.clone(),
            )),
        };
        Ok(stream)
    }
}
