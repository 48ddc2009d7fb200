//! InfluxDB line protocol encoding.

use crate::measurement::MeasurementRecord;
use std::collections::BTreeMap;
use std::fmt;

/// Field values for InfluxDB line protocol. Every quantity is stored as a
/// scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Integer(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Integer(num) => write!(f, "{num}i"),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    /// Nanoseconds since the Unix epoch
    pub timestamp_ns: Option<i64>,
}

const MEASUREMENT_SPECIAL: &[char] = &[',', ' '];
const KEY_SPECIAL: &[char] = &[',', '=', ' '];

fn write_escaped(f: &mut fmt::Formatter, s: &str, special: &[char]) -> fmt::Result {
    for c in s.chars() {
        if special.contains(&c) {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_escaped(f, &self.measurement, MEASUREMENT_SPECIAL)?;
        for (key, value) in &self.tag_set {
            f.write_str(",")?;
            write_escaped(f, key, KEY_SPECIAL)?;
            f.write_str("=")?;
            write_escaped(f, value, KEY_SPECIAL)?;
        }

        let mut separator = " ";
        for (key, value) in &self.field_set {
            f.write_str(separator)?;
            write_escaped(f, key, KEY_SPECIAL)?;
            write!(f, "={value}")?;
            separator = ",";
        }

        if let Some(nanos) = self.timestamp_ns {
            write!(f, " {nanos}")?;
        }
        Ok(())
    }
}

/// Join points into a write request body, one line per point.
pub fn encode_lines(points: &[DataPoint]) -> String {
    let mut body = String::new();
    for point in points {
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(&point.to_string());
    }
    body
}

fn identity_tags(record: &MeasurementRecord) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("identity".to_string(), record.identity.clone());
    tags.insert("nickname".to_string(), record.nickname.clone());
    tags.insert("model".to_string(), record.model.to_string());
    tags
}

fn quantity_point(
    record: &MeasurementRecord,
    measurement: &str,
    scale_factor: u8,
    unit: &str,
    value: i64,
) -> DataPoint {
    let mut tag_set = identity_tags(record);
    tag_set.insert("scale_factor".to_string(), scale_factor.to_string());
    tag_set.insert("unit".to_string(), unit.to_string());

    DataPoint {
        measurement: measurement.to_string(),
        tag_set,
        field_set: BTreeMap::from([("value".to_string(), FieldValue::Integer(value))]),
        timestamp_ns: Some(record.timestamp_ns),
    }
}

/// Points for the primary bucket: temperature, humidity, battery (when
/// reported) and rssi, each as an integer `value` at the record timestamp.
pub fn measurement_points(record: &MeasurementRecord) -> Vec<DataPoint> {
    let mut points = Vec::with_capacity(4);
    points.push(quantity_point(
        record,
        "temperature",
        10,
        "°C",
        record.temperature.raw().into(),
    ));
    points.push(quantity_point(
        record,
        "humidity",
        10,
        "%RH",
        record.humidity.raw().into(),
    ));
    if let Some(battery) = record.battery {
        points.push(quantity_point(record, "battery", 1, "%", battery.into()));
    }
    points.push(quantity_point(record, "rssi", 1, "dBm", record.rssi.into()));
    points
}

/// Point for the derived bucket describing how a record left the buffer.
pub fn pending_record_point(id: i64, record: &MeasurementRecord, uploaded_at_ns: i64) -> DataPoint {
    let delay_ms = uploaded_at_ns.saturating_sub(record.timestamp_ns) / 1_000_000;
    DataPoint {
        measurement: "pending_record".to_string(),
        tag_set: identity_tags(record),
        field_set: BTreeMap::from([
            ("id".to_string(), FieldValue::Integer(id)),
            ("upload_delay_ms".to_string(), FieldValue::Integer(delay_ms)),
        ]),
        timestamp_ns: Some(record.timestamp_ns),
    }
}
