use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of a Firehose transformation invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRecord {
    pub record_id: String,
    /// Base64 of the gzip-compressed CloudWatch Logs envelope.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinesis_record_metadata: Option<KinesisRecordMetadata>,
}

impl InboundRecord {
    pub fn partition_key(&self) -> Option<&str> {
        self.kinesis_record_metadata
            .as_ref()
            .map(|m| m.partition_key.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinesisRecordMetadata {
    pub partition_key: String,
}

/// Invocation payload delivered by Firehose.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirehoseEvent {
    pub records: Vec<InboundRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_kinesis_stream_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_stream_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
}

pub const CONTROL_MESSAGE: &str = "CONTROL_MESSAGE";
pub const DATA_MESSAGE: &str = "DATA_MESSAGE";

/// Decompressed CloudWatch Logs subscription payload.
///
/// Header fields are read leniently from the parsed JSON: a string is taken
/// as is, a non-zero number or `true` is stringified, and anything else
/// (empty string, `0`, `false`, `null`, arrays, objects) counts as missing.
#[derive(Debug, Clone)]
pub struct LogEnvelope {
    pub message_type: Option<String>,
    pub owner: Option<String>,
    pub log_group: Option<String>,
    pub log_stream: Option<String>,
    pub subscription_filters: Vec<String>,
    pub log_events: Vec<LogEvent>,
}

impl LogEnvelope {
    /// Read the envelope headers from a parsed payload. Events are left
    /// empty; see [`LogEnvelope::parse_events`].
    pub fn headers(value: &Value) -> Self {
        let subscription_filters = value
            .get("subscriptionFilters")
            .and_then(Value::as_array)
            .map(|filters| {
                filters
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            message_type: value
                .get("messageType")
                .and_then(Value::as_str)
                .map(str::to_string),
            owner: header_text(value, "owner"),
            log_group: header_text(value, "logGroup"),
            log_stream: header_text(value, "logStream"),
            subscription_filters,
            log_events: Vec::new(),
        }
    }

    /// Strictly parse `logEvents`; a missing list is empty.
    pub fn parse_events(&mut self, value: &Value) -> serde_json::Result<()> {
        self.log_events = match value.get("logEvents") {
            Some(events) => Vec::<LogEvent>::deserialize(events)?,
            None => Vec::new(),
        };
        Ok(())
    }

    /// Owner and log group, when both are present and non-empty.
    pub fn origin(&self) -> Option<(&str, &str)> {
        let owner = self.owner.as_deref().filter(|s| !s.is_empty())?;
        let log_group = self.log_group.as_deref().filter(|s| !s.is_empty())?;
        Some((owner, log_group))
    }
}

fn header_text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: String,
    pub timestamp: i64,
    pub message: String,
}

/// Splunk HEC-style event written back to Firehose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub time: i64,
    pub host: String,
    pub source: String,
    pub sourcetype: String,
    pub event: EventBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBody {
    pub id: String,
    pub message: EventMessage,
}

/// The `message` payload produced by the classifier.
///
/// Untagged so each variant serializes to exactly the shape downstream
/// searches expect; field order is part of the output format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventMessage {
    /// Lambda line carrying an extracted request id.
    FunctionRequest {
        message: String,
        function_request_id: String,
    },
    /// Unparseable ECS line annotated with container details.
    Container {
        message: String,
        #[serde(rename = "containerName")]
        container_name: String,
        #[serde(rename = "ecsTaskId")]
        ecs_task_id: String,
    },
    /// Parsed JSON object, possibly with hoisted fields or redactions.
    Structured(Map<String, Value>),
    /// Any other parsed JSON value.
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Ok,
    Dropped,
    ProcessingFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    pub record_id: String,
    pub result: ResultStatus,
    /// Base64 payload; only present when `result` is `Ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl RecordResult {
    pub fn ok(record_id: impl Into<String>, data: String) -> Self {
        Self {
            record_id: record_id.into(),
            result: ResultStatus::Ok,
            data: Some(data),
        }
    }

    pub fn dropped(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            result: ResultStatus::Dropped,
            data: None,
        }
    }

    pub fn processing_failed(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            result: ResultStatus::ProcessingFailed,
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == ResultStatus::Ok
    }

    /// Bytes this result contributes to the Firehose response.
    pub fn projected_size(&self) -> usize {
        match (&self.result, &self.data) {
            (ResultStatus::Ok, Some(data)) => self.record_id.len() + data.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub records: Vec<RecordResult>,
}

/// Original record bytes resubmitted to the source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReingestionRecord {
    pub data: Vec<u8>,
    /// Set for Kinesis sources only; Firehose entries carry data alone.
    pub partition_key: Option<String>,
}
