//! Remote time-series sink.
//!
//! The uplink talks to the sink only through the [`Sink`] trait so the drain
//! loop can be exercised without a live InfluxDB.

pub mod influxdb;
pub mod line_protocol;

use line_protocol::DataPoint;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned by sink operations.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("write to {destination} rejected with status {status}: {body}")]
    Rejected {
        destination: String,
        status: u16,
        body: String,
    },
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Boxed future returned by [`Sink`] methods.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

/// A remote store accepting whole batches of points.
pub trait Sink: Send + Sync {
    /// Check that the sink is reachable.
    fn ping(&self) -> SinkFuture<'_>;

    /// Write a batch to the named destination. The batch succeeds or fails as a whole.
    fn write<'a>(&'a self, destination: &'a str, points: &'a [DataPoint]) -> SinkFuture<'a>;
}
