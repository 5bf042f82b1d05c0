//! The row-publishing pipeline
//!
//! A [`Publisher`] owns its three collaborators and runs the fixed sequence
//! Idle → Connected → Publishing → Cooldown → Cleared → Done:
//!
//! 1. connect to the broker
//! 2. load every record from the spreadsheet
//! 3. publish one JSON payload per record, pausing [`PUBLISH_INTERVAL`] after each
//! 4. wait [`COOLDOWN`], then delete every item in the remote table
//!
//! Both waits race a shutdown signal. Once it fires nothing else is published
//! or deleted, and the connection is closed before `run` returns.
//!
//! The clear step removes *all* rows the scan returns, not only the ones this
//! run published. If the table accumulates data from other producers, this
//! run deletes that too.

use crate::config::PublisherConfig;
use crate::error::{PublisherError, PublisherResult};
use crate::protocol::{Payload, Record};
use crate::record_span;
use crate::source::LoadRows;
use crate::table::ScanAndDelete;
use crate::transport::Publish;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Pause after every publish
pub const PUBLISH_INTERVAL: Duration = Duration::from_secs(5);

/// Pause between the last publish and clearing the table
pub const COOLDOWN: Duration = Duration::from_secs(300);

/// Where the pipeline is in its single pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Idle,
    Connected,
    Publishing,
    Cooldown,
    Cleared,
    Done,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every record published and the table cleared
    Completed { published: usize, cleared: usize },
    /// Shutdown was requested; nothing was deleted
    Interrupted { published: usize },
}

/// Result of validating inputs without touching the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    pub records: usize,
    pub payload_bytes: usize,
}

/// Non-collaborator inputs of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherSettings {
    pub topic: String,
    pub spreadsheet: PathBuf,
    pub images_dir: PathBuf,
}

impl PublisherSettings {
    pub fn from_config(config: &PublisherConfig) -> Self {
        Self {
            topic: config.broker.topic.clone(),
            spreadsheet: config.source.spreadsheet.clone(),
            images_dir: config.source.images_dir.clone(),
        }
    }
}

enum LoopExit {
    Finished(usize),
    Interrupted(usize),
}

/// Row-publishing pipeline with injected collaborators
pub struct Publisher<L, P, T>
where
    L: LoadRows,
    P: Publish,
    T: ScanAndDelete,
{
    loader: L,
    transport: P,
    table: T,
    settings: PublisherSettings,
    state: PublisherState,
}

impl<L, P, T> Publisher<L, P, T>
where
    L: LoadRows,
    P: Publish,
    T: ScanAndDelete,
{
    pub fn new(loader: L, transport: P, table: T, settings: PublisherSettings) -> Self {
        Self {
            loader,
            transport,
            table,
            settings,
            state: PublisherState::Idle,
        }
    }

    pub fn state(&self) -> PublisherState {
        self.state
    }

    /// Get the transport instance for testing
    pub fn transport(&self) -> &P {
        &self.transport
    }

    /// Get the table instance for testing
    pub fn table(&self) -> &T {
        &self.table
    }

    fn transition(&mut self, next: PublisherState) {
        debug!(from = ?self.state, to = ?next, "Publisher state change");
        self.state = next;
    }

    /// Open the broker session
    pub async fn connect(&mut self) -> PublisherResult<()> {
        self.transport
            .connect()
            .await
            .map_err(PublisherError::transport)?;
        self.transition(PublisherState::Connected);
        Ok(())
    }

    /// Read every record from the configured spreadsheet
    pub fn load_records(&self) -> PublisherResult<Vec<Record>> {
        Ok(self.loader.load_rows(&self.settings.spreadsheet)?)
    }

    /// Build every payload without connecting anywhere
    pub fn check(&self) -> PublisherResult<CheckReport> {
        let records = self.load_records()?;

        let mut payload_bytes = 0;
        for record in &records {
            let payload = Payload::build(record, &self.settings.images_dir)?;
            payload_bytes += payload.to_json_bytes()?.len();
        }

        Ok(CheckReport {
            records: records.len(),
            payload_bytes,
        })
    }

    /// Run the whole pipeline once.
    ///
    /// The connection is released on every path out of this function,
    /// including errors raised after connecting. Shutdown during the
    /// connection handshake abandons it.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> PublisherResult<RunOutcome> {
        let span = crate::run_span!(topic = %self.settings.topic);
        async move {
            let connected = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => None,
                result = self.connect() => Some(result),
            };

            let result = match connected {
                Some(Ok(())) => self.publish_and_clear(&mut shutdown).await,
                Some(Err(e)) => return Err(e),
                None => {
                    info!("Stopped while connecting");
                    Ok(RunOutcome::Interrupted { published: 0 })
                }
            };

            if let Err(e) = self.transport.disconnect().await {
                warn!("Error while disconnecting: {}", e);
            }
            self.transition(PublisherState::Done);

            match &result {
                Ok(outcome) => info!(?outcome, "Publisher run finished"),
                Err(e) => warn!("Publisher run aborted: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn publish_and_clear(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> PublisherResult<RunOutcome> {
        if *shutdown.borrow() {
            info!("Stopped sending data");
            return Ok(RunOutcome::Interrupted { published: 0 });
        }

        let records = self.load_records()?;

        let published = match self.publish_all(&records, shutdown).await? {
            LoopExit::Finished(count) => count,
            LoopExit::Interrupted(count) => {
                return Ok(RunOutcome::Interrupted { published: count });
            }
        };

        match self.cooldown_and_clear(shutdown).await? {
            Some(cleared) => Ok(RunOutcome::Completed { published, cleared }),
            None => Ok(RunOutcome::Interrupted { published }),
        }
    }

    /// Publish records in order, pausing after each one
    async fn publish_all(
        &mut self,
        records: &[Record],
        shutdown: &mut watch::Receiver<bool>,
    ) -> PublisherResult<LoopExit> {
        self.transition(PublisherState::Publishing);

        for (index, record) in records.iter().enumerate() {
            if *shutdown.borrow() {
                info!("Stopped sending data");
                return Ok(LoopExit::Interrupted(index));
            }

            self.publish_record(record)
                .instrument(record_span!(row = index + 1))
                .await?;

            if !interruptible_sleep(shutdown, PUBLISH_INTERVAL).await {
                info!("Stopped sending data");
                return Ok(LoopExit::Interrupted(index + 1));
            }
        }

        Ok(LoopExit::Finished(records.len()))
    }

    async fn publish_record(&self, record: &Record) -> PublisherResult<()> {
        let payload = Payload::build(record, &self.settings.images_dir)?;
        let bytes = payload.to_json_bytes()?;

        self.transport
            .publish(&self.settings.topic, bytes)
            .await
            .map_err(PublisherError::transport)?;

        info!(id_number = %payload.id_number, "Published");
        Ok(())
    }

    /// Wait out the cooldown, then delete every item in the remote table.
    /// Returns `None` when shutdown interrupted the wait.
    pub async fn cooldown_and_clear(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> PublisherResult<Option<usize>> {
        self.transition(PublisherState::Cooldown);
        info!(
            wait_secs = COOLDOWN.as_secs(),
            "All rows processed, waiting before clearing the remote table"
        );

        if !interruptible_sleep(shutdown, COOLDOWN).await {
            info!("Stopped before clearing the remote table");
            return Ok(None);
        }

        let cleared = self.clear_table().await?;
        self.transition(PublisherState::Cleared);
        Ok(Some(cleared))
    }

    /// Delete every key the scan returns
    async fn clear_table(&self) -> PublisherResult<usize> {
        let keys = self
            .table
            .scan_keys()
            .await
            .map_err(PublisherError::table)?;

        if keys.is_empty() {
            info!("Remote table already empty");
            return Ok(0);
        }

        warn!(
            count = keys.len(),
            "Deleting every item in the remote table, not only this run's rows"
        );
        let deleted = self
            .table
            .delete_keys(&keys)
            .await
            .map_err(PublisherError::table)?;

        info!(deleted, "Cleared all data from the remote table");
        Ok(deleted)
    }
}

/// Resolves once shutdown is requested; never if the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

/// Sleep for `duration` unless shutdown is signalled first.
/// Returns true if the full duration elapsed, false if shutdown was requested.
pub async fn interruptible_sleep(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;

    loop {
        if *shutdown.borrow_and_update() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender gone: no shutdown can arrive any more
                    tokio::time::sleep_until(deadline).await;
                    return true;
                }
            }
        }
    }
}
