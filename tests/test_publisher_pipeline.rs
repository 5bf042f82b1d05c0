//! End-to-end behavior of the publishing pipeline against in-memory doubles
//!
//! Time is paused, so the 5 s and 300 s waits complete instantly while
//! `tokio::time::Instant` still reports exact offsets.

use sanitation_publisher::error::PublisherError;
use sanitation_publisher::protocol::{CellValue, Record};
use sanitation_publisher::publisher::{
    Publisher, PublisherState, RunOutcome, COOLDOWN, PUBLISH_INTERVAL,
};
use sanitation_publisher::table::ItemKey;
use sanitation_publisher::testing::{MockRows, MockTable, MockTransport, TableCall};
use sanitation_publisher::transport::Publish;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use test_helpers::{images_dir_with, mock_publisher, records_for, test_settings};

#[tokio::test(start_paused = true)]
async fn test_publishes_every_row_in_order_with_pauses() {
    let ids = [101, 102, 103];
    let images = images_dir_with(&ids);
    let transport = MockTransport::new();
    let table = MockTable::new();
    let mut publisher = mock_publisher(records_for(&ids), transport.clone(), table, images.path());

    let (_tx, rx) = watch::channel(false);
    let outcome = publisher.run(rx).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            published: 3,
            cleared: 0
        }
    );

    let messages = transport.published_messages();
    assert_eq!(messages.len(), 3);

    let published_ids: Vec<String> = messages
        .iter()
        .map(|m| m.json()["id_number"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(published_ids, vec!["101", "102", "103"]);

    for pair in messages.windows(2) {
        assert_eq!(pair[1].at - pair[0].at, PUBLISH_INTERVAL);
    }
    assert!(messages.iter().all(|m| m.topic == "sdk/test/python"));
    assert_eq!(publisher.state(), PublisherState::Done);
}

#[tokio::test(start_paused = true)]
async fn test_single_cooldown_precedes_clear() {
    let ids = [1, 2];
    let images = images_dir_with(&ids);
    let transport = MockTransport::new();
    let table = MockTable::with_items(vec![ItemKey::Text("1".to_string())]);
    let mut publisher =
        mock_publisher(records_for(&ids), transport.clone(), table.clone(), images.path());

    let (_tx, rx) = watch::channel(false);
    publisher.run(rx).await.unwrap();

    let last_publish = transport.published_messages().last().unwrap().at;
    let delete_at = table.first_delete_at().expect("table was cleared");

    // Last row's pause, then the cooldown
    assert_eq!(delete_at - last_publish, PUBLISH_INTERVAL + COOLDOWN);

    let calls = table.recorded_calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], TableCall::Scan(at) if at == delete_at));
}

#[tokio::test(start_paused = true)]
async fn test_clear_deletes_unrelated_items() {
    let ids = [101];
    let images = images_dir_with(&ids);
    let table = MockTable::with_items(vec![
        ItemKey::Text("101".to_string()),
        ItemKey::Text("from-another-producer".to_string()),
        ItemKey::Number("7".to_string()),
    ]);
    let mut publisher =
        mock_publisher(records_for(&ids), MockTransport::new(), table.clone(), images.path());

    let (_tx, rx) = watch::channel(false);
    let outcome = publisher.run(rx).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            published: 1,
            cleared: 3
        }
    );
    assert!(table.remaining_items().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_during_publishing_stops_and_skips_clear() {
    let ids = [1, 2, 3, 4];
    let images = images_dir_with(&ids);
    let (tx, rx) = watch::channel(false);
    let transport = MockTransport::new().shutdown_after(2, tx);
    let table = MockTable::with_items(vec![ItemKey::Text("keep".to_string())]);
    let mut publisher =
        mock_publisher(records_for(&ids), transport.clone(), table.clone(), images.path());

    let outcome = publisher.run(rx).await.unwrap();

    assert_eq!(outcome, RunOutcome::Interrupted { published: 2 });
    assert_eq!(transport.published_messages().len(), 2);
    assert_eq!(transport.disconnect_count(), 1);
    assert!(!transport.is_connected());
    assert!(table.recorded_calls().is_empty());
    assert_eq!(table.remaining_items().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_during_cooldown_skips_clear() {
    let ids = [1];
    let images = images_dir_with(&ids);
    let transport = MockTransport::new();
    let table = MockTable::with_items(vec![ItemKey::Text("1".to_string())]);
    let mut publisher =
        mock_publisher(records_for(&ids), transport.clone(), table.clone(), images.path());

    let (tx, rx) = watch::channel(false);
    let start = Instant::now();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(100)).await;
        let _ = tx.send(true);
    });

    let outcome = publisher.run(rx).await.unwrap();

    assert_eq!(outcome, RunOutcome::Interrupted { published: 1 });
    assert!(start.elapsed() < PUBLISH_INTERVAL + COOLDOWN);
    assert!(table.recorded_calls().is_empty());
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_run_publishes_nothing() {
    let ids = [1, 2];
    let images = images_dir_with(&ids);
    let transport = MockTransport::new();
    let table = MockTable::new();
    let mut publisher =
        mock_publisher(records_for(&ids), transport.clone(), table.clone(), images.path());

    let (_tx, rx) = watch::channel(true);
    let outcome = publisher.run(rx).await.unwrap();

    assert_eq!(outcome, RunOutcome::Interrupted { published: 0 });
    assert!(transport.published_messages().is_empty());
    assert_eq!(transport.disconnect_count(), 1);
    assert!(table.recorded_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_aborts_run() {
    let ids = [1, 2, 3];
    let images = images_dir_with(&ids);
    let transport = MockTransport::failing_publish_at(1);
    let table = MockTable::with_items(vec![ItemKey::Text("1".to_string())]);
    let mut publisher =
        mock_publisher(records_for(&ids), transport.clone(), table.clone(), images.path());

    let (_tx, rx) = watch::channel(false);
    let err = publisher.run(rx).await.unwrap_err();

    assert!(matches!(err, PublisherError::Transport(_)));
    assert_eq!(transport.published_messages().len(), 1);
    assert_eq!(transport.disconnect_count(), 1);
    assert!(table.recorded_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_reads_nothing() {
    let images = images_dir_with(&[1]);
    let rows = MockRows::new(records_for(&[1]));
    let transport = MockTransport::with_connect_failure();
    let mut publisher = Publisher::new(
        rows.clone(),
        transport.clone(),
        MockTable::new(),
        test_settings(images.path()),
    );

    let (_tx, rx) = watch::channel(false);
    let err = publisher.run(rx).await.unwrap_err();

    assert!(matches!(err, PublisherError::Transport(_)));
    assert!(rows.requested_paths().is_empty());
    assert_eq!(publisher.state(), PublisherState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_missing_image_is_fatal() {
    let images = images_dir_with(&[1]);
    let records = vec![
        records_for(&[1]).remove(0),
        Record {
            image_path: "missing.jpg".to_string(),
            ..records_for(&[2]).remove(0)
        },
    ];
    let transport = MockTransport::new();
    let table = MockTable::new();
    let mut publisher = mock_publisher(records, transport.clone(), table.clone(), images.path());

    let (_tx, rx) = watch::channel(false);
    let err = publisher.run(rx).await.unwrap_err();

    match err {
        PublisherError::ImageRead { path, .. } => {
            assert_eq!(path, images.path().join("missing.jpg"));
        }
        other => panic!("expected image read error, got {other:?}"),
    }
    assert_eq!(transport.published_messages().len(), 1);
    assert!(table.recorded_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_source_failure_is_fatal_after_connect() {
    let images = images_dir_with(&[]);
    let transport = MockTransport::new();
    let mut publisher = Publisher::new(
        MockRows::with_failure("ID Number is empty"),
        transport.clone(),
        MockTable::new(),
        test_settings(images.path()),
    );

    let (_tx, rx) = watch::channel(false);
    let err = publisher.run(rx).await.unwrap_err();

    assert!(matches!(err, PublisherError::Source(_)));
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_example_row_payload() {
    let images = tempfile::TempDir::new().unwrap();
    std::fs::write(images.path().join("a.jpg"), b"hello").unwrap();

    let record = Record {
        hotel_name: "Cafe A".to_string(),
        id_number: CellValue::Int(101),
        sanitation: CellValue::from("Pass"),
        image_name: "a.jpg".to_string(),
        image_path: "a.jpg".to_string(),
    };
    let transport = MockTransport::new();
    let mut publisher =
        mock_publisher(vec![record], transport.clone(), MockTable::new(), images.path());

    let (_tx, rx) = watch::channel(false);
    publisher.run(rx).await.unwrap();

    let messages = transport.published_messages();
    assert_eq!(
        String::from_utf8(messages[0].payload.clone()).unwrap(),
        r#"{"hotel_name":"Cafe A","id_number":"101","sanitation":"Pass","image_name":"a.jpg","image_data":"aGVsbG8="}"#
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_sheet_still_waits_then_clears() {
    let images = images_dir_with(&[]);
    let table = MockTable::with_items(vec![ItemKey::Text("stale".to_string())]);
    let mut publisher = mock_publisher(Vec::new(), MockTransport::new(), table.clone(), images.path());

    let (_tx, rx) = watch::channel(false);
    let start = Instant::now();
    let outcome = publisher.run(rx).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            published: 0,
            cleared: 1
        }
    );
    assert_eq!(table.first_delete_at().unwrap() - start, COOLDOWN);
}

#[tokio::test]
async fn test_check_builds_every_payload_offline() {
    let ids = [5, 6];
    let images = images_dir_with(&ids);
    let transport = MockTransport::new();
    let publisher = mock_publisher(records_for(&ids), transport.clone(), MockTable::new(), images.path());

    let report = publisher.check().unwrap();

    assert_eq!(report.records, 2);
    assert!(report.payload_bytes > 0);
    assert_eq!(transport.connect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scan_failure_aborts_clear() {
    let ids = [1, 2];
    let images = images_dir_with(&ids);
    let transport = MockTransport::new();
    let table = MockTable::failing_scan(vec![ItemKey::Text("1".to_string())]);
    let mut publisher =
        mock_publisher(records_for(&ids), transport.clone(), table.clone(), images.path());

    let (_tx, rx) = watch::channel(false);
    let result = publisher.run(rx).await;

    assert!(matches!(result, Err(PublisherError::Table(_))));
    assert_eq!(transport.published_messages().len(), 2);
    assert_eq!(transport.disconnect_count(), 1);
    assert!(table.first_delete_at().is_none());
    assert_eq!(table.remaining_items().len(), 1);
    assert_ne!(publisher.state(), PublisherState::Cleared);
}

#[tokio::test(start_paused = true)]
async fn test_delete_failure_aborts_clear() {
    let ids = [1];
    let images = images_dir_with(&ids);
    let transport = MockTransport::new();
    let table = MockTable::failing_delete(vec![
        ItemKey::Text("1".to_string()),
        ItemKey::Text("other".to_string()),
    ]);
    let mut publisher =
        mock_publisher(records_for(&ids), transport.clone(), table.clone(), images.path());

    let (_tx, rx) = watch::channel(false);
    let result = publisher.run(rx).await;

    match result {
        Err(PublisherError::Table(source)) => assert!(source.to_string().contains("delete rejected")),
        other => panic!("expected remote table error, got {other:?}"),
    }
    assert_eq!(transport.disconnect_count(), 1);
    assert_eq!(table.recorded_calls().len(), 2);
    assert_eq!(table.remaining_items().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_connect_abandons_handshake() {
    let images = images_dir_with(&[1]);
    let rows = MockRows::new(records_for(&[1]));
    let transport = MockTransport::with_connect_delay(Duration::from_secs(30));
    let table = MockTable::with_items(vec![ItemKey::Text("1".to_string())]);
    let mut publisher = Publisher::new(
        rows.clone(),
        transport.clone(),
        table.clone(),
        test_settings(images.path()),
    );

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let _ = tx.send(true);
    });

    let start = Instant::now();
    let outcome = publisher.run(rx).await.unwrap();

    assert_eq!(outcome, RunOutcome::Interrupted { published: 0 });
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.disconnect_count(), 1);
    assert!(rows.requested_paths().is_empty());
    assert!(transport.published_messages().is_empty());
    assert!(table.recorded_calls().is_empty());
}
