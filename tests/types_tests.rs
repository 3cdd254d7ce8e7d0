//! Tests for core types.

use logprocessor::types::{
    BatchResult, EventBody, EventMessage, FirehoseEvent, LogEnvelope, NormalizedEvent,
    RecordResult, ResultStatus,
};
use serde_json::json;

#[test]
fn test_firehose_event_deserialization() {
    let raw = json!({
        "invocationId": "inv-1",
        "deliveryStreamArn": "arn:aws:firehose:eu-west-2:123456789012:deliverystream/splunk",
        "region": "eu-west-2",
        "records": [
            {"recordId": "r1", "approximateArrivalTimestamp": 1, "data": "H4sI"},
            {
                "recordId": "r2",
                "data": "H4sI",
                "kinesisRecordMetadata": {"partitionKey": "pk-2", "shardId": "shardId-0"}
            }
        ]
    });

    let event: FirehoseEvent = serde_json::from_value(raw).unwrap();
    assert_eq!(event.invocation_id.as_deref(), Some("inv-1"));
    assert!(event.source_kinesis_stream_arn.is_none());
    assert_eq!(event.records.len(), 2);
    assert_eq!(event.records[0].record_id, "r1");
    assert_eq!(event.records[0].partition_key(), None);
    assert_eq!(event.records[1].partition_key(), Some("pk-2"));
}

#[test]
fn test_record_result_serialization() {
    let ok = serde_json::to_value(RecordResult::ok("r1", "ZGF0YQ==".to_string())).unwrap();
    assert_eq!(ok, json!({"recordId": "r1", "result": "Ok", "data": "ZGF0YQ=="}));

    let dropped = serde_json::to_value(RecordResult::dropped("r2")).unwrap();
    assert_eq!(dropped, json!({"recordId": "r2", "result": "Dropped"}));

    let failed = serde_json::to_value(RecordResult::processing_failed("r3")).unwrap();
    assert_eq!(failed, json!({"recordId": "r3", "result": "ProcessingFailed"}));
}

#[test]
fn test_batch_result_shape() {
    let batch = BatchResult {
        records: vec![RecordResult::dropped("a")],
    };
    assert_eq!(
        serde_json::to_string(&batch).unwrap(),
        r#"{"records":[{"recordId":"a","result":"Dropped"}]}"#
    );
}

#[test]
fn test_projected_size_counts_ok_only() {
    assert_eq!(RecordResult::ok("abc", "12345".to_string()).projected_size(), 8);
    assert_eq!(RecordResult::dropped("abc").projected_size(), 0);
    assert_eq!(RecordResult::processing_failed("abc").projected_size(), 0);

    let mut demoted = RecordResult::ok("abc", "12345".to_string());
    demoted.result = ResultStatus::Dropped;
    assert_eq!(demoted.projected_size(), 0);
}

#[test]
fn test_envelope_origin() {
    let value = json!({
        "messageType": "DATA_MESSAGE",
        "owner": "123456789012",
        "logGroup": "/aws/lambda/fn",
        "logStream": "2024/01/01/[$LATEST]abc",
        "subscriptionFilters": ["all"],
        "logEvents": [{"id": "1", "timestamp": 10, "message": "hi"}]
    });
    let mut envelope = LogEnvelope::headers(&value);
    assert_eq!(envelope.message_type.as_deref(), Some("DATA_MESSAGE"));
    assert_eq!(envelope.origin(), Some(("123456789012", "/aws/lambda/fn")));
    assert_eq!(envelope.subscription_filters, vec!["all".to_string()]);
    assert!(envelope.log_events.is_empty());

    envelope.parse_events(&value).unwrap();
    assert_eq!(envelope.log_events.len(), 1);

    let no_owner = LogEnvelope::headers(&json!({
        "messageType": "DATA_MESSAGE",
        "owner": "",
        "logGroup": "/aws/lambda/fn"
    }));
    assert_eq!(no_owner.origin(), None);

    let no_group = LogEnvelope::headers(&json!({"messageType": "DATA_MESSAGE", "owner": "1"}));
    assert_eq!(no_group.origin(), None);
}

#[test]
fn test_envelope_headers_are_lenient() {
    let envelope = LogEnvelope::headers(&json!({
        "messageType": 7,
        "owner": 123456789012i64,
        "logGroup": true,
        "logStream": {"nested": "value"},
        "subscriptionFilters": "not-a-list"
    }));
    assert_eq!(envelope.message_type, None);
    assert_eq!(envelope.owner.as_deref(), Some("123456789012"));
    assert_eq!(envelope.log_group.as_deref(), Some("true"));
    assert_eq!(envelope.log_stream, None);
    assert!(envelope.subscription_filters.is_empty());

    let falsy = LogEnvelope::headers(&json!({"owner": 0, "logGroup": false, "logStream": null}));
    assert_eq!(falsy.owner, None);
    assert_eq!(falsy.log_group, None);
    assert_eq!(falsy.log_stream, None);

    let not_an_object = LogEnvelope::headers(&json!([]));
    assert_eq!(not_an_object.message_type, None);
    assert_eq!(not_an_object.origin(), None);
}

#[test]
fn test_envelope_events_are_strict() {
    let value = json!({"logEvents": [{"id": "1", "message": "no timestamp"}]});
    let mut envelope = LogEnvelope::headers(&value);
    assert!(envelope.parse_events(&value).is_err());

    let mut empty = LogEnvelope::headers(&json!({}));
    empty.parse_events(&json!({})).unwrap();
    assert!(empty.log_events.is_empty());
}

#[test]
fn test_event_message_shapes() {
    let text = serde_json::to_value(EventMessage::Text("plain".into())).unwrap();
    assert_eq!(text, json!("plain"));

    let request = serde_json::to_string(&EventMessage::FunctionRequest {
        message: "END RequestId: 1".into(),
        function_request_id: "1".into(),
    })
    .unwrap();
    assert_eq!(
        request,
        r#"{"message":"END RequestId: 1","function_request_id":"1"}"#
    );

    let container = serde_json::to_string(&EventMessage::Container {
        message: "oops".into(),
        container_name: "web".into(),
        ecs_task_id: "t1".into(),
    })
    .unwrap();
    assert_eq!(
        container,
        r#"{"message":"oops","containerName":"web","ecsTaskId":"t1"}"#
    );

    let json_value = serde_json::to_value(EventMessage::Json(json!([1, 2]))).unwrap();
    assert_eq!(json_value, json!([1, 2]));
}

#[test]
fn test_normalized_event_field_order() {
    let event = NormalizedEvent {
        time: 5,
        host: "AWS:AccountNumber:1".into(),
        source: "AWS:LogGroup:g".into(),
        sourcetype: "aws:cloudwatch".into(),
        event: EventBody {
            id: "e".into(),
            message: EventMessage::Text("m".into()),
        },
    };
    assert_eq!(
        serde_json::to_string(&event).unwrap(),
        r#"{"time":5,"host":"AWS:AccountNumber:1","source":"AWS:LogGroup:g","sourcetype":"aws:cloudwatch","event":{"id":"e","message":"m"}}"#
    );
}

#[test]
fn test_structured_message_keeps_key_order() {
    let map = match serde_json::from_str::<serde_json::Value>(r#"{"z":1,"a":2,"m":3}"#).unwrap() {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    assert_eq!(
        serde_json::to_string(&EventMessage::Structured(map)).unwrap(),
        r#"{"z":1,"a":2,"m":3}"#
    );
}
