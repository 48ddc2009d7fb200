//! BLE advertisement source.
//!
//! Scanning is behind the [`Scanner`] trait so ingestion can be driven by a
//! fake in tests. A scanner only reports what it saw through a [`Forwarder`],
//! which keeps unmonitored devices out of the ingest channel. Decoding happens
//! downstream in [`crate::ingest`].

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::app::Shutdown;
use crate::mac_address::MacAddress;
use crate::registry::Registry;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

/// One observed advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Advertised local name, if any
    pub name: Option<String>,
    pub mac: MacAddress,
    /// Manufacturer data with the company id already stripped
    pub manufacturer_data: Option<Vec<u8>>,
    /// Signal strength in dBm
    pub rssi: i16,
}

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(&'static str),
}

/// Boxed future returned by [`Scanner::scan`].
pub type ScanFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ScanError>> + Send + 'a>>;

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    /// Hand advertisements to `forwarder` until `shutdown` fires or the
    /// receiver goes away. Returns early only on adapter failure.
    fn scan(&self, forwarder: Forwarder, shutdown: Shutdown) -> ScanFuture<'_>;
}

/// Scanner using the BlueZ daemon over D-Bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct BluezScanner;

impl Scanner for BluezScanner {
    fn scan(&self, forwarder: Forwarder, shutdown: Shutdown) -> ScanFuture<'_> {
        #[cfg(feature = "bluer")]
        return Box::pin(bluer::scan(forwarder, shutdown));

        #[cfg(not(feature = "bluer"))]
        {
            let _ = (forwarder, shutdown);
            Box::pin(async { Err(ScanError::BackendNotAvailable("bluer")) })
        }
    }
}

/// Sending half of the ingest channel, restricted to monitored sensors.
///
/// Nearby phones and headphones advertise far more often than the sensors
/// do, so they are dropped here and never take channel capacity.
#[derive(Debug, Clone)]
pub struct Forwarder {
    tx: mpsc::Sender<Advertisement>,
    registry: Arc<Registry>,
}

impl Forwarder {
    pub fn new(tx: mpsc::Sender<Advertisement>, registry: Arc<Registry>) -> Self {
        Self { tx, registry }
    }

    /// Hand an advertisement to the ingestion task without waiting.
    ///
    /// Unmonitored advertisements are skipped and a full channel drops the
    /// advertisement. Returns `false` once the receiver is gone.
    pub fn forward(&self, advert: Advertisement) -> bool {
        if self
            .registry
            .lookup_advertiser(advert.name.as_deref(), advert.mac)
            .is_none()
        {
            trace!(name = ?advert.name, mac = %advert.mac, "skipping unmonitored device");
            return !self.tx.is_closed();
        }

        match self.tx.try_send(advert) {
            Ok(()) => true,
            Err(TrySendError::Full(advert)) => {
                warn!(name = ?advert.name, mac = %advert.mac, "ingest channel full, dropping advertisement");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Pick the payload to decode from a device's manufacturer data.
///
/// Govee sensors send a single entry; when there are several the lowest
/// company id wins so the choice is stable.
pub fn first_manufacturer_payload(data: &HashMap<u16, Vec<u8>>) -> Option<Vec<u8>> {
    data.iter()
        .min_by_key(|(company, _)| **company)
        .map(|(_, payload)| payload.clone())
}
