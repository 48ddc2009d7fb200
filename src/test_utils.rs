use crate::app::{Shutdown, shutdown_requested};
use crate::mac_address::MacAddress;
use crate::measurement::{MeasurementRecord, Tenths};
use crate::model::Model;
use crate::output::line_protocol::DataPoint;
use crate::output::{Sink, SinkError, SinkFuture};
use crate::registry::SensorConfig;
use crate::scanner::{Advertisement, Forwarder, ScanError, ScanFuture, Scanner};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Poll `done` every 100ms for up to a minute. Under a paused clock this
/// lets blocking buffer calls and timers make progress between checks.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..600 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xA4, 0xC1, 0x38, 0x00, 0x77, 0x05]);

/// Decode a hex string such as `"0103aecd39"`.
pub fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

/// Pack temperature and humidity tenths into the sensor's 3-byte reading.
pub fn encode_reading(temperature: i32, humidity: i32) -> [u8; 3] {
    let magnitude = temperature.unsigned_abs() * 1000 + humidity as u32;
    let raw = if temperature < 0 {
        magnitude | 0x80_0000
    } else {
        magnitude
    };
    let [_, a, b, c] = raw.to_be_bytes();
    [a, b, c]
}

/// H5072 manufacturer data for the given reading.
pub fn h5072_payload(temperature: i32, humidity: i32, battery: u8) -> Vec<u8> {
    let mut payload = vec![0x01];
    payload.extend_from_slice(&encode_reading(temperature, humidity));
    payload.push(battery);
    payload
}

pub fn sensor(identity: &str, nickname: &str, model: Model) -> SensorConfig {
    SensorConfig {
        identity: identity.to_string(),
        nickname: nickname.to_string(),
        model,
    }
}

/// The sensors most tests register: one named H5072, one H5105 known by MAC.
pub fn test_sensors() -> Vec<SensorConfig> {
    vec![
        sensor("GVH5072_7705", "Garden", Model::H5072),
        sensor("A4:C1:38:00:51:05", "Kitchen", Model::H5105),
    ]
}

pub fn advertisement(name: Option<&str>, mac: MacAddress, data: Option<Vec<u8>>) -> Advertisement {
    Advertisement {
        name: name.map(str::to_string),
        mac,
        manufacturer_data: data,
        rssi: -75,
    }
}

pub fn h5072_record() -> MeasurementRecord {
    MeasurementRecord {
        timestamp_ns: 69420,
        identity: "GVH5072_7705".to_string(),
        nickname: "Garden".to_string(),
        model: Model::H5072,
        temperature: Tenths(-241),
        humidity: Tenths(357),
        battery: Some(57),
        rssi: -75,
    }
}

pub fn h5105_record() -> MeasurementRecord {
    MeasurementRecord {
        timestamp_ns: 69420,
        identity: "A4:C1:38:00:51:05".to_string(),
        nickname: "Kitchen".to_string(),
        model: Model::H5105,
        temperature: Tenths(215),
        humidity: Tenths(483),
        battery: None,
        rssi: -60,
    }
}

/// In-memory [`Sink`] that records every write as encoded lines.
#[derive(Debug, Default)]
pub struct FakeSink {
    writes: Mutex<Vec<(String, Vec<String>)>>,
    fail_writes: AtomicBool,
    fail_destination: Mutex<Option<String>>,
    fail_ping: AtomicBool,
    pings: AtomicUsize,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn unreachable() -> Self {
        let sink = Self::default();
        sink.fail_ping.store(true, Ordering::SeqCst);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    /// Reject writes to `destination` only; `None` clears it.
    pub fn fail_destination(&self, destination: Option<&str>) {
        *self.fail_destination.lock().unwrap() = destination.map(str::to_string);
    }

    pub fn writes(&self) -> Vec<(String, Vec<String>)> {
        self.writes.lock().unwrap().clone()
    }

    /// All lines written to `destination`, in write order.
    pub fn lines(&self, destination: &str) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter(|(d, _)| d == destination)
            .flat_map(|(_, lines)| lines)
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

impl Sink for FakeSink {
    fn ping(&self) -> SinkFuture<'_> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_ping.load(Ordering::SeqCst) {
            Err(SinkError::Unavailable("fake sink is down".to_string()))
        } else {
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn write<'a>(&'a self, destination: &'a str, points: &'a [DataPoint]) -> SinkFuture<'a> {
        Box::pin(async move {
            let rejected = self.fail_writes.load(Ordering::SeqCst)
                || self.fail_destination.lock().unwrap().as_deref() == Some(destination);
            if rejected {
                return Err(SinkError::Rejected {
                    destination: destination.to_string(),
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            let lines = points.iter().map(ToString::to_string).collect();
            self.writes
                .lock()
                .unwrap()
                .push((destination.to_string(), lines));
            Ok(())
        })
    }
}

/// What a [`FakeScanner`] does once its advertisements are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterScan {
    WaitForShutdown,
    Fail,
}

/// [`Scanner`] replaying a fixed list of advertisements.
#[derive(Debug)]
pub struct FakeScanner {
    adverts: Vec<Advertisement>,
    after: AfterScan,
}

impl FakeScanner {
    pub fn new(adverts: Vec<Advertisement>, after: AfterScan) -> Self {
        Self { adverts, after }
    }
}

impl Scanner for FakeScanner {
    fn scan(&self, forwarder: Forwarder, mut shutdown: Shutdown) -> ScanFuture<'_> {
        Box::pin(async move {
            for advert in self.adverts.iter().cloned() {
                if !forwarder.forward(advert) {
                    return Ok(());
                }
            }
            match self.after {
                AfterScan::WaitForShutdown => {
                    shutdown_requested(&mut shutdown).await;
                    Ok(())
                }
                AfterScan::Fail => Err(ScanError::Bluetooth("adapter removed".to_string())),
            }
        })
    }
}
