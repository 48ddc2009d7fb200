//! BlueZ D-Bus backend.
//!
//! Uses the `bluer` crate to talk to the BlueZ daemon, so `bluetoothd` must
//! be running. Discovery runs with duplicate reporting on so every
//! advertisement surfaces as a device change.

use super::{Advertisement, Forwarder, ScanError, first_manufacturer_payload};
use crate::app::{Shutdown, shutdown_requested};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use tracing::{debug, info, trace};

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Scan on the default adapter until shutdown.
pub async fn scan(forwarder: Forwarder, mut shutdown: Shutdown) -> Result<(), ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let events = adapter.discover_devices_with_changes().await?;
    futures::pin_mut!(events);
    info!(adapter = adapter.name(), "BLE discovery started");

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                info!("BLE discovery stopped");
                return Ok(());
            }
            event = events.next() => {
                let Some(event) = event else {
                    return Err(ScanError::Bluetooth("discovery stream ended".to_string()));
                };
                let AdapterEvent::DeviceAdded(address) = event else {
                    continue;
                };
                match read_advertisement(&adapter, address).await {
                    Ok(Some(advert)) => {
                        if !forwarder.forward(advert) {
                            return Ok(());
                        }
                    }
                    Ok(None) => {}
                    Err(err) => debug!(%address, %err, "failed to read device properties"),
                }
            }
        }
    }
}

/// Snapshot a device's latest advertisement. `None` while BlueZ has no
/// current signal strength, which means the data is cached rather than live.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Option<Advertisement>, ScanError> {
    let device = adapter.device(address)?;
    let Some(rssi) = device.rssi().await? else {
        trace!(%address, "skipping device without rssi");
        return Ok(None);
    };

    Ok(Some(Advertisement {
        name: device.name().await?,
        mac: address.into(),
        manufacturer_data: device
            .manufacturer_data()
            .await?
            .as_ref()
            .and_then(first_manufacturer_payload),
        rssi,
    }))
}
