//! Unpacking of Firehose records into CloudWatch Logs envelopes.

use std::io::Read;

use anyhow::{Context, Result};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use flate2::read::MultiGzDecoder;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{InboundRecord, LogEnvelope, RecordResult, CONTROL_MESSAGE, DATA_MESSAGE};

/// Standard alphabet, tolerant of missing padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Outcome of decoding one inbound record.
#[derive(Debug)]
pub enum Decoded {
    /// The record needs no classification; its result is final.
    Resolved(RecordResult),
    /// A data message ready for classification.
    Envelope(LogEnvelope),
}

/// Decode a record into its envelope, or a final result when the record
/// cannot or need not be transformed.
///
/// Corrupt compression and unexpected envelope headers are per-record
/// failures. A payload that decompresses but is not JSON, or whose
/// `logEvents` are malformed, is an error for the whole invocation.
pub fn decode_record(record: &InboundRecord) -> Result<Decoded> {
    let payload = match decompress_record_data(&record.data) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(record_id = %record.record_id, error = %err, "failed to decompress record");
            return Ok(Decoded::Resolved(RecordResult::processing_failed(
                &record.record_id,
            )));
        }
    };

    let value: Value = serde_json::from_slice(&payload)
        .with_context(|| format!("parsing log envelope of record {}", record.record_id))?;
    let mut envelope = LogEnvelope::headers(&value);

    match envelope.message_type.as_deref() {
        // Sent by CloudWatch Logs to check the subscription; carries no events.
        Some(CONTROL_MESSAGE) => Ok(Decoded::Resolved(RecordResult::dropped(&record.record_id))),
        Some(DATA_MESSAGE) if envelope.origin().is_some() => {
            envelope
                .parse_events(&value)
                .with_context(|| format!("parsing log events of record {}", record.record_id))?;
            Ok(Decoded::Envelope(envelope))
        }
        Some(DATA_MESSAGE) => {
            info!(
                record_id = %record.record_id,
                log_group = ?envelope.log_group,
                owner = ?envelope.owner,
                log_stream = ?envelope.log_stream,
                "data message lacking logGroup or owner"
            );
            Ok(Decoded::Resolved(RecordResult::processing_failed(
                &record.record_id,
            )))
        }
        _ => {
            debug!(
                record_id = %record.record_id,
                message_type = ?value.get("messageType"),
                "unexpected message type"
            );
            Ok(Decoded::Resolved(RecordResult::processing_failed(
                &record.record_id,
            )))
        }
    }
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    LENIENT_BASE64
        .decode(data.trim())
        .context("decoding base64 record data")
}

pub fn gunzip(compressed: &[u8]) -> Result<Vec<u8>> {
    if compressed.is_empty() {
        anyhow::bail!("empty gzip payload");
    }
    let mut decoder = MultiGzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .context("gzip decompression failed")?;
    Ok(out)
}

pub fn decompress_record_data(data: &str) -> Result<Vec<u8>> {
    gunzip(&decode_base64(data)?)
}
