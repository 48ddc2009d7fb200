//! Producer side of the pipeline: advertisement in, buffered record out.
//!
//! The scanner forwards raw advertisements from monitored sensors over a
//! bounded channel. This task resolves them against the registry, decodes,
//! throttles, and writes the resulting records to the ingestion buffer.

use crate::app::{Shutdown, shutdown_requested};
use crate::buffer::{BufferError, Enqueued, IngestionBuffer};
use crate::decode::{DecodeError, decode};
use crate::measurement::MeasurementRecord;
use crate::registry::Registry;
use crate::scanner::Advertisement;
use crate::throttle::Throttle;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Errors that stop the ingestion task.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("advertisement channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// What became of one advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Record(MeasurementRecord),
    /// Not a configured sensor
    Unmonitored,
    /// A record for this sensor was kept too recently
    Throttled,
    Rejected(DecodeError),
}

/// Bounded retry for enqueues that hit a locked buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueRetry {
    pub attempts: u32,
    pub backoff: Duration,
}

/// Turns advertisements into measurement records.
#[derive(Debug)]
pub struct Ingester {
    registry: Arc<Registry>,
    throttle: Option<Throttle>,
}

impl Ingester {
    pub fn new(registry: Arc<Registry>, throttle: Option<Duration>) -> Self {
        Self {
            registry,
            throttle: throttle.map(Throttle::new),
        }
    }

    /// Classify one advertisement seen at `observed_at` (wall clock, used as
    /// the record timestamp) and `now` (monotonic, used for throttling).
    pub fn observe(
        &mut self,
        advert: &Advertisement,
        observed_at: SystemTime,
        now: Instant,
    ) -> Outcome {
        let Some(sensor) = self
            .registry
            .lookup_advertiser(advert.name.as_deref(), advert.mac)
        else {
            trace!(name = ?advert.name, mac = %advert.mac, "ignoring unmonitored device");
            return Outcome::Unmonitored;
        };

        let reading = match &advert.manufacturer_data {
            Some(data) => decode(sensor.model, data).map_err(|err| (err, hex_bytes(data))),
            None => Err((DecodeError::MissingManufacturerData, String::new())),
        };
        let reading = match reading {
            Ok(reading) => reading,
            Err((err, payload)) => {
                warn!(sensor = %sensor.nickname, %payload, %err, "discarding advertisement");
                return Outcome::Rejected(err);
            }
        };

        let identity = sensor.identity.to_string();
        if let Some(throttle) = self.throttle.as_mut()
            && !throttle.should_emit(&identity, now)
        {
            return Outcome::Throttled;
        }

        Outcome::Record(MeasurementRecord::new(
            sensor,
            reading,
            advert.rssi,
            observed_at,
        ))
    }
}

fn hex_bytes(data: &[u8]) -> String {
    data.iter().fold(String::with_capacity(data.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Enqueue `record`, retrying while the buffer reports itself unavailable.
pub async fn enqueue_with_retry(
    buffer: &IngestionBuffer,
    record: &MeasurementRecord,
    retry: EnqueueRetry,
) -> Result<Enqueued, BufferError> {
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        let candidate = record.clone();
        match buffer.run_blocking(move |b| b.enqueue(&candidate)).await {
            Err(err) if err.is_unavailable() && attempt < attempts => {
                warn!(attempt, attempts, %err, "buffer busy, retrying enqueue");
                tokio::time::sleep(retry.backoff).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

async fn store(
    buffer: &IngestionBuffer,
    record: MeasurementRecord,
    retry: EnqueueRetry,
) -> Result<(), IngestError> {
    match enqueue_with_retry(buffer, &record, retry).await {
        Ok(Enqueued::Inserted(id)) => {
            trace!(id, sensor = %record.nickname, "buffered record");
        }
        Ok(Enqueued::Duplicate) => {
            debug!(sensor = %record.nickname, "duplicate advertisement ignored");
        }
        Err(err @ (BufferError::Poisoned | BufferError::Task(_))) => return Err(err.into()),
        Err(err) => {
            warn!(sensor = %record.nickname, %err, "dropping record after failed enqueue");
        }
    }
    Ok(())
}

/// Consume advertisements until shutdown.
///
/// Advertisements already queued when shutdown fires are still processed.
/// Failed enqueues lose that one record and never end the task.
pub async fn run(
    mut ingester: Ingester,
    mut rx: mpsc::Receiver<Advertisement>,
    buffer: IngestionBuffer,
    retry: EnqueueRetry,
    mut shutdown: Shutdown,
) -> Result<(), IngestError> {
    info!("ingestion started");
    loop {
        let advert = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            advert = rx.recv() => advert.ok_or(IngestError::ChannelClosed)?,
        };
        if let Outcome::Record(record) =
            ingester.observe(&advert, SystemTime::now(), Instant::now())
        {
            store(&buffer, record, retry).await?;
        }
    }

    rx.close();
    while let Some(advert) = rx.recv().await {
        if let Outcome::Record(record) =
            ingester.observe(&advert, SystemTime::now(), Instant::now())
        {
            store(&buffer, record, retry).await?;
        }
    }
    info!("ingestion stopped");
    Ok(())
}
