//! Tests for record assembly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use logprocessor::assemble::{assemble, serialize_events};
use logprocessor::types::{EventBody, EventMessage, NormalizedEvent, ResultStatus};

fn event(id: &str, message: &str) -> NormalizedEvent {
    NormalizedEvent {
        time: 1000,
        host: "AWS:AccountNumber:1".to_string(),
        source: "AWS:LogGroup:g".to_string(),
        sourcetype: "aws:cloudwatch".to_string(),
        event: EventBody {
            id: id.to_string(),
            message: EventMessage::Text(message.to_string()),
        },
    }
}

#[test]
fn test_events_concatenated_without_delimiter() {
    let events = vec![event("1", "a"), event("2", "b")];
    let payload = serialize_events(&events, "").unwrap();
    let first = serde_json::to_string(&events[0]).unwrap();
    let second = serde_json::to_string(&events[1]).unwrap();
    assert_eq!(payload, format!("{first}{second}"));
}

#[test]
fn test_delimiter_follows_each_event() {
    let events = vec![event("1", "a"), event("2", "b")];
    let payload = serialize_events(&events, "\n").unwrap();
    assert_eq!(payload.lines().count(), 2);
    assert!(payload.ends_with("}\n"));
}

#[test]
fn test_assemble_encodes_payload() {
    let events = vec![event("1", "a")];
    let result = assemble("rec-9", &events, "").unwrap();
    assert_eq!(result.record_id, "rec-9");
    assert_eq!(result.result, ResultStatus::Ok);

    let decoded = STANDARD.decode(result.data.unwrap()).unwrap();
    let text = String::from_utf8(decoded).unwrap();
    assert_eq!(
        text,
        r#"{"time":1000,"host":"AWS:AccountNumber:1","source":"AWS:LogGroup:g","sourcetype":"aws:cloudwatch","event":{"id":"1","message":"a"}}"#
    );
}

#[test]
fn test_no_events_gives_empty_ok_record() {
    let result = assemble("rec-0", &[], "").unwrap();
    assert_eq!(result.result, ResultStatus::Ok);
    assert_eq!(result.data.as_deref(), Some(""));
}
