//! Which stream a Firehose invocation reads from, and therefore where
//! overflowing records are written back to.

use anyhow::{Context, Result};

use crate::types::FirehoseEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Firehose reading from a Kinesis data stream; entries keep their partition key.
    Kinesis,
    /// Direct-put Firehose delivery stream; entries carry data only.
    Firehose,
}

impl StreamKind {
    pub fn for_event(event: &FirehoseEvent) -> Self {
        if event.source_kinesis_stream_arn.is_some() {
            StreamKind::Kinesis
        } else {
            StreamKind::Firehose
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamArn {
    pub arn: String,
    pub region: String,
    pub name: String,
}

impl StreamArn {
    /// Parse `arn:aws:<service>:<region>:<account>:<type>/<name>`.
    pub fn parse(arn: &str) -> Result<Self> {
        let parts: Vec<&str> = arn.split(':').collect();
        if parts.len() < 6 || parts[0] != "arn" {
            anyhow::bail!("malformed stream arn: {arn}");
        }
        let region = parts[3];
        if region.is_empty() {
            anyhow::bail!("stream arn has no region: {arn}");
        }
        let name = parts[5..]
            .join(":")
            .split('/')
            .nth(1)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .with_context(|| format!("stream arn has no stream name: {arn}"))?;
        Ok(Self {
            arn: arn.to_string(),
            region: region.to_string(),
            name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDestination {
    Kinesis(StreamArn),
    Firehose(StreamArn),
}

impl StreamDestination {
    pub fn from_event(event: &FirehoseEvent) -> Result<Self> {
        match StreamKind::for_event(event) {
            StreamKind::Kinesis => {
                let arn = event
                    .source_kinesis_stream_arn
                    .as_deref()
                    .context("missing sourceKinesisStreamArn")?;
                Ok(StreamDestination::Kinesis(StreamArn::parse(arn)?))
            }
            StreamKind::Firehose => {
                let arn = event
                    .delivery_stream_arn
                    .as_deref()
                    .context("invocation carries neither sourceKinesisStreamArn nor deliveryStreamArn")?;
                Ok(StreamDestination::Firehose(StreamArn::parse(arn)?))
            }
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            StreamDestination::Kinesis(_) => StreamKind::Kinesis,
            StreamDestination::Firehose(_) => StreamKind::Firehose,
        }
    }

    pub fn arn(&self) -> &StreamArn {
        match self {
            StreamDestination::Kinesis(arn) | StreamDestination::Firehose(arn) => arn,
        }
    }
}
