use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::types::{NormalizedEvent, RecordResult};

/// Join the serialized events of one record into its Firehose output.
///
/// Events are written back to back followed by `delimiter`, which is empty
/// for the Splunk HEC sink.
pub fn assemble(record_id: &str, events: &[NormalizedEvent], delimiter: &str) -> Result<RecordResult> {
    let payload = serialize_events(events, delimiter)
        .with_context(|| format!("serializing events of record {record_id}"))?;
    Ok(RecordResult::ok(record_id, STANDARD.encode(payload)))
}

pub fn serialize_events(events: &[NormalizedEvent], delimiter: &str) -> Result<String> {
    let mut payload = String::with_capacity(events.len() * 256);
    for ev in events {
        payload.push_str(&serde_json::to_string(ev)?);
        payload.push_str(delimiter);
    }
    Ok(payload)
}
