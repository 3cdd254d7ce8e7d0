//! Per-source classification of CloudWatch log events into Splunk events.
//!
//! The log group prefix decides how a message is interpreted. Every path
//! falls back to the raw message string, so classification never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::types::{EventBody, EventMessage, LogEvent, NormalizedEvent};

pub const LAMBDA_PREFIX: &str = "/aws/lambda/";
pub const STEP_FUNCTIONS_PREFIX: &str = "/aws/stepfunctions/";
pub const ECS_PREFIX: &str = "/aws/ecs/";

const UNKNOWN: &str = "unknown";
const REDACTED: &str = "redacted";

/// Step Functions `details` fields that may carry request payloads.
const REDACTED_FIELDS: [&str; 3] = ["output", "parameters", "input"];

/// (output key, lower-cased header name) pairs hoisted from execution input.
const CORRELATION_HEADERS: [(&str, &str); 4] = [
    ("apigw-request-id", "apigw-request-id"),
    ("X-Amzn-Trace-Id", "x-amzn-trace-id"),
    ("x-correlation-id", "x-correlation-id"),
    ("x-request-id", "x-request-id"),
];

// REPORT / START / END framing lines.
static REQUEST_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"RequestId:\s*([a-fA-F0-9-]+)").expect("valid regex"));

// Runtime log lines: `2023-08-22T09:52:29.585Z 720f4d20-... <message>`.
static TIMESTAMP_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]{3}Z\s+([a-fA-F0-9-]+)")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogGroupKind {
    Lambda,
    StepFunctions,
    Ecs,
    Generic,
}

impl LogGroupKind {
    pub fn from_log_group(log_group: &str) -> Self {
        if log_group.starts_with(LAMBDA_PREFIX) {
            LogGroupKind::Lambda
        } else if log_group.starts_with(STEP_FUNCTIONS_PREFIX) {
            LogGroupKind::StepFunctions
        } else if log_group.starts_with(ECS_PREFIX) {
            LogGroupKind::Ecs
        } else {
            LogGroupKind::Generic
        }
    }
}

/// Where a batch of log events came from.
#[derive(Debug, Clone, Copy)]
pub struct LogSource<'a> {
    pub owner: &'a str,
    pub log_group: &'a str,
    pub log_stream: &'a str,
}

pub fn classify(event: &LogEvent, source: &LogSource<'_>, sourcetype: &str) -> NormalizedEvent {
    let kind = LogGroupKind::from_log_group(source.log_group);
    NormalizedEvent {
        time: event.timestamp,
        host: format!("AWS:AccountNumber:{}", source.owner),
        source: format!("AWS:LogGroup:{}", source.log_group),
        sourcetype: sourcetype.to_string(),
        event: EventBody {
            id: event.id.clone(),
            message: classify_message(kind, &event.message, source.log_stream),
        },
    }
}

pub fn classify_message(kind: LogGroupKind, message: &str, log_stream: &str) -> EventMessage {
    match kind {
        LogGroupKind::Lambda => lambda_message(message),
        LogGroupKind::StepFunctions => step_functions_message(message),
        LogGroupKind::Ecs => ecs_message(message, log_stream),
        LogGroupKind::Generic => match parse_json(message) {
            Some(value) => from_value(value),
            None => EventMessage::Text(message.to_string()),
        },
    }
}

fn lambda_message(message: &str) -> EventMessage {
    if let Some(value) = parse_json(message) {
        return from_value(value);
    }
    match extract_function_request_id(message) {
        Some(function_request_id) => EventMessage::FunctionRequest {
            message: message.to_string(),
            function_request_id,
        },
        None => EventMessage::Text(message.to_string()),
    }
}

pub fn extract_function_request_id(message: &str) -> Option<String> {
    REQUEST_ID_PATTERN
        .captures(message)
        .or_else(|| TIMESTAMP_ID_PATTERN.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn step_functions_message(message: &str) -> EventMessage {
    let Some(mut value) = parse_json(message) else {
        return EventMessage::Text(message.to_string());
    };
    if let Value::Object(map) = &mut value {
        if let Some(headers) = normalized_headers(map) {
            for (key, header) in CORRELATION_HEADERS {
                match headers.get(header) {
                    Some(v) => {
                        map.insert(key.to_string(), v.clone());
                    }
                    None => {
                        map.shift_remove(key);
                    }
                }
            }
        }
        redact_details(map);
    }
    from_value(value)
}

/// Headers of the execution input with lower-cased names. `None` when
/// `details.input` is not a JSON string carrying a non-null `headers` value.
fn normalized_headers(message: &Map<String, Value>) -> Option<Map<String, Value>> {
    let input = message.get("details")?.get("input")?.as_str()?;
    let input: Value = serde_json::from_str(input).ok()?;
    match input.get("headers")? {
        Value::Null => None,
        Value::Object(headers) => Some(
            headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        ),
        _ => Some(Map::new()),
    }
}

fn redact_details(message: &mut Map<String, Value>) {
    if let Some(Value::Object(details)) = message.get_mut("details") {
        for field in REDACTED_FIELDS {
            if let Some(v) = details.get_mut(field) {
                *v = Value::String(REDACTED.to_string());
            }
        }
    }
}

fn ecs_message(message: &str, log_stream: &str) -> EventMessage {
    let (container_name, ecs_task_id) = container_details(log_stream);
    match parse_json(message) {
        Some(Value::Object(mut map)) => {
            map.insert("containerName".to_string(), Value::String(container_name));
            map.insert("ecsTaskId".to_string(), Value::String(ecs_task_id));
            EventMessage::Structured(map)
        }
        Some(Value::Null) | None => EventMessage::Container {
            message: message.to_string(),
            container_name,
            ecs_task_id,
        },
        Some(other) => EventMessage::Json(other),
    }
}

/// Container name and task id from an `ecs/<container>/<task>` stream name.
pub fn container_details(log_stream: &str) -> (String, String) {
    let mut segments = log_stream.split('/').skip(1);
    let mut next = || {
        segments
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string()
    };
    let container_name = next();
    let ecs_task_id = next();
    (container_name, ecs_task_id)
}

fn parse_json(message: &str) -> Option<Value> {
    serde_json::from_str(message).ok()
}

fn from_value(value: Value) -> EventMessage {
    match value {
        Value::Object(map) => EventMessage::Structured(map),
        other => EventMessage::Json(other),
    }
}
