//! Govee thermometer measurement record.

use crate::decode::Reading;
use crate::model::Model;
use crate::registry::LogicalSensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed-point value scaled by ten (`241` is `24.1`).
///
/// Serialized as the raw integer so the durable buffer and the wire format
/// never go through floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tenths(pub i32);

impl Tenths {
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{}", abs / 10, abs % 10)
    }
}

/// One decoded advertisement from a monitored sensor.
///
/// Created once per valid advertisement and never mutated afterwards; it
/// travels by value through the buffer and the uplink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Observation time, nanoseconds since the Unix epoch
    pub timestamp_ns: i64,
    /// Configured identity (device name or MAC) of the sensor
    pub identity: String,
    /// Human-readable sensor name
    pub nickname: String,
    pub model: Model,
    /// Temperature in tenths of a degree Celsius
    #[serde(rename = "temperature_c_10x")]
    pub temperature: Tenths,
    /// Relative humidity in tenths of a percent
    #[serde(rename = "humidity_percent_10x")]
    pub humidity: Tenths,
    /// Battery level in percent, present only for models that report it
    #[serde(
        rename = "battery_percent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub battery: Option<u8>,
    /// Received signal strength in dBm
    pub rssi: i16,
}

impl MeasurementRecord {
    pub fn new(sensor: &LogicalSensor, reading: Reading, rssi: i16, observed_at: SystemTime) -> Self {
        Self {
            timestamp_ns: unix_nanos(observed_at),
            identity: sensor.identity.to_string(),
            nickname: sensor.nickname.clone(),
            model: sensor.model,
            temperature: reading.temperature,
            humidity: reading.humidity,
            battery: reading.battery,
            rssi,
        }
    }

    /// Encoding stored in the ingestion buffer.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Nanoseconds since the Unix epoch, clamped to the `i64` range.
pub fn unix_nanos(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{h5072_record, h5105_record};

    #[test]
    fn test_tenths_display() {
        assert_eq!(Tenths(241).to_string(), "24.1");
        assert_eq!(Tenths(-241).to_string(), "-24.1");
        assert_eq!(Tenths(-5).to_string(), "-0.5");
        assert_eq!(Tenths(0).to_string(), "0.0");
        assert_eq!(Tenths(999).to_string(), "99.9");
    }

    #[test]
    fn test_json_encoding_uses_fixed_point_integers() {
        let json = h5072_record().to_json().unwrap();
        assert_eq!(
            json,
            "{\"timestamp_ns\":69420,\"identity\":\"GVH5072_7705\",\"nickname\":\"Garden\",\
             \"model\":\"H5072\",\"temperature_c_10x\":-241,\"humidity_percent_10x\":357,\
             \"battery_percent\":57,\"rssi\":-75}"
        );
    }

    #[test]
    fn test_json_omits_missing_battery() {
        let record = h5105_record();
        let json = record.to_json().unwrap();
        assert!(!json.contains("battery_percent"));
        assert_eq!(MeasurementRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn test_unix_nanos() {
        let time = UNIX_EPOCH + std::time::Duration::from_millis(1_500);
        assert_eq!(unix_nanos(time), 1_500_000_000);
        assert_eq!(unix_nanos(UNIX_EPOCH - std::time::Duration::from_secs(1)), 0);
    }
}
