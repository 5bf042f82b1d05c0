//! Mock implementations for testing
//!
//! Provides mock LoadRows, Publish, and ScanAndDelete implementations so the
//! pipeline can run without a spreadsheet, a broker, or a remote table.
//! Every recorded event carries a [`tokio::time::Instant`], which follows the
//! paused test clock.

use crate::protocol::{CellValue, Record};
use crate::source::{LoadRows, SourceError};
use crate::table::{ItemKey, ScanAndDelete};
use crate::transport::Publish;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Error raised by the mocks when told to fail
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Mock failure: {0}")]
pub struct MockError(pub String);

/// One message captured by [`MockTransport`]
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub at: Instant,
}

impl PublishedMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Build a record with the given id and an image file name
pub fn sample_record(id: i64, image_file: &str) -> Record {
    Record {
        hotel_name: format!("Hotel {id}"),
        id_number: CellValue::Int(id),
        sanitation: CellValue::from("Clean"),
        image_name: format!("image {id}"),
        image_path: image_file.to_string(),
    }
}

/// Mock row loader returning fixed records
#[derive(Debug, Clone, Default)]
pub struct MockRows {
    pub records: Vec<Record>,
    pub fail_with: Option<String>,
    pub requested: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockRows {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn with_failure(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn requested_paths(&self) -> Vec<PathBuf> {
        self.requested.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LoadRows for MockRows {
    fn load_rows(&self, path: &Path) -> Result<Vec<Record>, SourceError> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(path.to_path_buf());
        }

        match &self.fail_with {
            Some(message) => Err(SourceError::InvalidRecord {
                row: 1,
                message: message.clone(),
            }),
            None => Ok(self.records.clone()),
        }
    }
}

/// Mock transport for testing
///
/// Clones share their recorded state, so a test can keep one handle while
/// the publisher owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub published: Arc<Mutex<Vec<PublishedMessage>>>,
    pub connect_calls: Arc<AtomicUsize>,
    pub disconnect_calls: Arc<AtomicUsize>,
    connected: Arc<AtomicBool>,
    pub fail_connect: bool,
    /// Time the handshake takes before it resolves
    pub connect_delay: Option<Duration>,
    /// Fail the publish with this zero-based index
    pub fail_publish_at: Option<usize>,
    /// Send shutdown once this many messages were published
    shutdown_after: Option<(usize, Arc<watch::Sender<bool>>)>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_failure() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    pub fn with_connect_delay(delay: Duration) -> Self {
        Self {
            connect_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn failing_publish_at(index: usize) -> Self {
        Self {
            fail_publish_at: Some(index),
            ..Default::default()
        }
    }

    /// Request shutdown right after the `count`th successful publish
    pub fn shutdown_after(mut self, count: usize, sender: watch::Sender<bool>) -> Self {
        self.shutdown_after = Some((count, Arc::new(sender)));
        self
    }

    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publish for MockTransport {
    type Error = MockError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect {
            return Err(MockError("connection refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MockError("not connected".to_string()));
        }

        let mut published = self
            .published
            .lock()
            .map_err(|_| MockError("poisoned".to_string()))?;

        if self.fail_publish_at == Some(published.len()) {
            return Err(MockError("publish rejected".to_string()));
        }

        published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            at: Instant::now(),
        });

        if let Some((count, sender)) = &self.shutdown_after {
            if published.len() == *count {
                let _ = sender.send(true);
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Calls observed by [`MockTable`]
#[derive(Debug, Clone, PartialEq)]
pub enum TableCall {
    Scan(Instant),
    Delete(Instant, Vec<ItemKey>),
}

/// In-memory remote table
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    pub items: Arc<Mutex<Vec<ItemKey>>>,
    pub calls: Arc<Mutex<Vec<TableCall>>>,
    pub fail_scan: bool,
    pub fail_delete: bool,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with the given keys
    pub fn with_items(keys: Vec<ItemKey>) -> Self {
        Self {
            items: Arc::new(Mutex::new(keys)),
            ..Default::default()
        }
    }

    /// Table whose scan fails
    pub fn failing_scan(keys: Vec<ItemKey>) -> Self {
        Self {
            fail_scan: true,
            ..Self::with_items(keys)
        }
    }

    /// Table whose batch delete fails
    pub fn failing_delete(keys: Vec<ItemKey>) -> Self {
        Self {
            fail_delete: true,
            ..Self::with_items(keys)
        }
    }

    pub fn remaining_items(&self) -> Vec<ItemKey> {
        self.items.lock().map(|i| i.clone()).unwrap_or_default()
    }

    pub fn recorded_calls(&self) -> Vec<TableCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Time of the first delete call, if any
    pub fn first_delete_at(&self) -> Option<Instant> {
        self.recorded_calls().into_iter().find_map(|call| match call {
            TableCall::Delete(at, _) => Some(at),
            TableCall::Scan(_) => None,
        })
    }

    fn record(&self, call: TableCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ScanAndDelete for MockTable {
    type Error = MockError;

    async fn scan_keys(&self) -> Result<Vec<ItemKey>, Self::Error> {
        self.record(TableCall::Scan(Instant::now()));
        if self.fail_scan {
            return Err(MockError("scan throttled".to_string()));
        }
        Ok(self.remaining_items())
    }

    async fn delete_keys(&self, keys: &[ItemKey]) -> Result<usize, Self::Error> {
        self.record(TableCall::Delete(Instant::now(), keys.to_vec()));
        if self.fail_delete {
            return Err(MockError("delete rejected".to_string()));
        }

        let mut items = self
            .items
            .lock()
            .map_err(|_| MockError("poisoned".to_string()))?;
        let before = items.len();
        items.retain(|item| !keys.contains(item));
        Ok(before - items.len())
    }
}
