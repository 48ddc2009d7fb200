//! Consumer side of the pipeline: buffered records out to the sink.
//!
//! Every cycle the drainer reads the oldest batch, writes it to the primary
//! bucket (and the derived bucket when configured), and deletes it from the
//! buffer only after every write succeeded. A failed cycle leaves the batch
//! in place for the next one, so delivery is at-least-once.

use crate::app::{Shutdown, shutdown_requested};
use crate::buffer::{BufferError, IngestionBuffer, PendingEntry};
use crate::measurement::unix_nanos;
use crate::output::line_protocol::{DataPoint, measurement_points, pending_record_point};
use crate::output::{Sink, SinkError};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace, warn};

/// Drainer tuning and destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkConfig {
    /// Pause between drain cycles
    pub interval: Duration,
    /// Maximum records per cycle
    pub batch_size: usize,
    /// Bucket receiving measurement points
    pub bucket: String,
    /// Bucket receiving per-record `pending_record` points, if any
    pub derived_bucket: Option<String>,
}

/// Where the drainer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Waiting for the next tick
    Idle,
    /// Batch fetched, writes in flight
    Draining,
    /// Writes accepted, delete in flight
    Acking,
}

/// Result of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Empty,
    Delivered { records: usize, points: usize },
}

#[derive(Error, Debug)]
pub enum DrainError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("write to {destination} failed: {source}")]
    Sink {
        destination: String,
        #[source]
        source: SinkError,
    },
}

/// Moves batches from the ingestion buffer to a [`Sink`].
pub struct Drainer<S: Sink + ?Sized> {
    buffer: IngestionBuffer,
    sink: Arc<S>,
    config: UplinkConfig,
    state: watch::Sender<DrainState>,
}

impl<S: Sink + ?Sized> Drainer<S> {
    pub fn new(buffer: IngestionBuffer, sink: Arc<S>, config: UplinkConfig) -> Self {
        Self {
            buffer,
            sink,
            config,
            state: watch::channel(DrainState::Idle).0,
        }
    }

    pub fn state(&self) -> DrainState {
        *self.state.borrow()
    }

    /// Follow state changes, including those of a cycle running in another task.
    pub fn subscribe_state(&self) -> watch::Receiver<DrainState> {
        self.state.subscribe()
    }

    fn enter(&self, state: DrainState) {
        trace!(?state, "drainer state");
        self.state.send_replace(state);
    }

    /// Run one fetch-write-delete cycle.
    pub async fn drain_once(&mut self) -> Result<DrainOutcome, DrainError> {
        self.enter(DrainState::Draining);
        let result = self.drain_batch().await;
        self.enter(DrainState::Idle);
        result
    }

    async fn drain_batch(&mut self) -> Result<DrainOutcome, DrainError> {
        let limit = self.config.batch_size;
        let batch = self
            .buffer
            .run_blocking(move |b| b.drain_batch(limit))
            .await?;
        if batch.is_empty() {
            return Ok(DrainOutcome::Empty);
        }

        let points: Vec<DataPoint> = batch
            .iter()
            .flat_map(|entry| measurement_points(&entry.record))
            .collect();
        self.write(&self.config.bucket, &points).await?;

        if let Some(derived) = &self.config.derived_bucket {
            self.write(derived, &derived_points(&batch)).await?;
        }

        self.enter(DrainState::Acking);
        let ids: Vec<i64> = batch.iter().map(|entry| entry.id).collect();
        self.buffer.run_blocking(move |b| b.delete(&ids)).await?;

        Ok(DrainOutcome::Delivered {
            records: batch.len(),
            points: points.len(),
        })
    }

    async fn write(&self, destination: &str, points: &[DataPoint]) -> Result<(), DrainError> {
        self.sink
            .write(destination, points)
            .await
            .map_err(|source| DrainError::Sink {
                destination: destination.to_string(),
                source,
            })
    }

    /// Drain every `interval` until shutdown. A cycle already in flight
    /// finishes before the loop exits.
    ///
    /// Sink and storage failures are logged and retried on the next tick;
    /// only a broken buffer handle ends the loop.
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<(), DrainError> {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?period, bucket = %self.config.bucket, "uplink started");

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            // Keep going while full batches come back so a backlog clears
            // without waiting a tick per batch.
            loop {
                match self.drain_once().await {
                    Ok(DrainOutcome::Empty) => {
                        trace!("nothing to upload");
                        break;
                    }
                    Ok(DrainOutcome::Delivered { records, points }) => {
                        debug!(records, points, "uploaded batch");
                        if records < self.config.batch_size || *shutdown.borrow() {
                            break;
                        }
                    }
                    Err(DrainError::Buffer(err @ (BufferError::Poisoned | BufferError::Task(_)))) => {
                        return Err(err.into());
                    }
                    Err(err) => {
                        self.report_failure(&err).await;
                        break;
                    }
                }
            }
        }

        info!("uplink stopped");
        Ok(())
    }

    async fn report_failure(&self, err: &DrainError) {
        match self.buffer.run_blocking(|b| b.depth()).await {
            Ok(pending) => warn!(%err, pending, "upload failed, batch kept for next cycle"),
            Err(_) => warn!(%err, "upload failed, batch kept for next cycle"),
        }
    }
}

fn derived_points(batch: &[PendingEntry]) -> Vec<DataPoint> {
    let uploaded_at = unix_nanos(SystemTime::now());
    batch
        .iter()
        .map(|entry| pending_record_point(entry.id, &entry.record, uploaded_at))
        .collect()
}
