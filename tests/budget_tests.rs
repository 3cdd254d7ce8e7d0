//! Tests for output size budgeting and re-ingestion selection.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use logprocessor::budget::{projected_size, reingestion_record, select_for_reingestion, BudgetLimits};
use logprocessor::config::Config;
use logprocessor::destination::StreamKind;
use logprocessor::types::{InboundRecord, KinesisRecordMetadata, RecordResult, ResultStatus};

fn inbound(i: usize) -> InboundRecord {
    InboundRecord {
        record_id: format!("r{i}"),
        data: STANDARD.encode(format!("original-{i}")),
        kinesis_record_metadata: Some(KinesisRecordMetadata {
            partition_key: format!("pk-{i}"),
        }),
    }
}

fn inbound_batch(n: usize) -> Vec<InboundRecord> {
    (0..n).map(inbound).collect()
}

/// `Ok` results whose payload is `data_len` bytes.
fn ok_results(records: &[InboundRecord], data_len: usize) -> Vec<RecordResult> {
    records
        .iter()
        .map(|r| RecordResult::ok(r.record_id.clone(), "x".repeat(data_len)))
        .collect()
}

fn limits(max_output_bytes: usize, batch_size: usize) -> BudgetLimits {
    BudgetLimits {
        max_output_bytes,
        batch_size,
    }
}

#[test]
fn test_projected_size() {
    let records = inbound_batch(3);
    let mut results = ok_results(&records, 8);
    assert_eq!(projected_size(&results), 30);

    results[1] = RecordResult::processing_failed("r1");
    assert_eq!(projected_size(&results), 20);
}

#[test]
fn test_under_budget_is_untouched() {
    let records = inbound_batch(3);
    let results = ok_results(&records, 8);
    let selection =
        select_for_reingestion(results.clone(), &records, StreamKind::Firehose, limits(30, 500))
            .unwrap();
    assert_eq!(selection.results, results);
    assert!(selection.batches.is_empty());
    assert_eq!(selection.demoted_count(), 0);
}

#[test]
fn test_demotes_from_the_start() {
    let records = inbound_batch(3);
    let results = ok_results(&records, 8);
    // 30 bytes projected; dropping one payload frees 8.
    let selection =
        select_for_reingestion(results, &records, StreamKind::Firehose, limits(25, 500)).unwrap();

    assert_eq!(selection.demoted, vec![0]);
    assert_eq!(selection.results[0].result, ResultStatus::Dropped);
    assert!(selection.results[0].data.is_none());
    assert!(selection.results[1].is_ok());
    assert!(selection.results[2].is_ok());
    assert_eq!(selection.batches.len(), 1);
    assert_eq!(selection.batches[0][0].data, b"original-0");
}

#[test]
fn test_record_ids_still_count_after_demotion() {
    let records = inbound_batch(3);
    let results = ok_results(&records, 8);
    // Freeing payloads alone can't get 30 below 10, so every Ok record goes.
    let selection =
        select_for_reingestion(results, &records, StreamKind::Firehose, limits(10, 500)).unwrap();
    assert_eq!(selection.demoted, vec![0, 1, 2]);
    assert!(selection.results.iter().all(|r| r.result == ResultStatus::Dropped));
    assert_eq!(selection.batches.len(), 1);
    assert_eq!(selection.batches[0].len(), 3);
}

#[test]
fn test_non_ok_results_are_skipped() {
    let records = inbound_batch(3);
    let mut results = ok_results(&records, 8);
    results[0] = RecordResult::dropped("r0");
    results[1] = RecordResult::processing_failed("r1");
    let selection =
        select_for_reingestion(results, &records, StreamKind::Firehose, limits(5, 500)).unwrap();

    assert_eq!(selection.demoted, vec![2]);
    assert_eq!(selection.results[0].result, ResultStatus::Dropped);
    assert_eq!(selection.results[1].result, ResultStatus::ProcessingFailed);
    assert_eq!(selection.results[2].result, ResultStatus::Dropped);
}

#[test]
fn test_result_order_and_ids_preserved() {
    let records = inbound_batch(5);
    let results = ok_results(&records, 8);
    let selection =
        select_for_reingestion(results, &records, StreamKind::Firehose, limits(25, 500)).unwrap();
    let ids: Vec<&str> = selection.results.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, vec!["r0", "r1", "r2", "r3", "r4"]);
}

#[test]
fn test_batches_split_at_batch_size() {
    let records = inbound_batch(501);
    let results = ok_results(&records, 1);
    let selection =
        select_for_reingestion(results, &records, StreamKind::Kinesis, limits(1, 500)).unwrap();

    assert_eq!(selection.demoted_count(), 501);
    assert_eq!(selection.batches.len(), 2);
    assert_eq!(selection.batches[0].len(), 500);
    assert_eq!(selection.batches[1].len(), 1);
    assert_eq!(selection.batches[1][0].partition_key.as_deref(), Some("pk-500"));
}

#[test]
fn test_exact_batch_size_gives_one_batch() {
    let records = inbound_batch(500);
    let results = ok_results(&records, 1);
    let selection =
        select_for_reingestion(results, &records, StreamKind::Firehose, limits(1, 500)).unwrap();
    assert_eq!(selection.batches.len(), 1);
    assert_eq!(selection.batches[0].len(), 500);
}

#[test]
fn test_small_batch_size_from_config() {
    let cfg = Config {
        max_output_bytes: 1,
        reingest_batch_size: 2,
        ..Config::default()
    };
    let records = inbound_batch(5);
    let results = ok_results(&records, 1);
    let selection =
        select_for_reingestion(results, &records, StreamKind::Firehose, BudgetLimits::from(&cfg))
            .unwrap();
    let sizes: Vec<usize> = selection.batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[test]
fn test_length_mismatch_is_an_error() {
    let records = inbound_batch(2);
    let results = ok_results(&records[..1], 1);
    assert!(
        select_for_reingestion(results, &records, StreamKind::Firehose, limits(1, 500)).is_err()
    );
}

#[test]
fn test_kinesis_entries_carry_partition_key() {
    let entry = reingestion_record(StreamKind::Kinesis, &inbound(7)).unwrap();
    assert_eq!(entry.data, b"original-7");
    assert_eq!(entry.partition_key.as_deref(), Some("pk-7"));
}

#[test]
fn test_firehose_entries_have_no_partition_key() {
    let entry = reingestion_record(StreamKind::Firehose, &inbound(7)).unwrap();
    assert_eq!(entry.data, b"original-7");
    assert_eq!(entry.partition_key, None);
}

#[test]
fn test_kinesis_entry_without_partition_key_errors() {
    let mut record = inbound(1);
    record.kinesis_record_metadata = None;
    assert!(reingestion_record(StreamKind::Kinesis, &record).is_err());
}
