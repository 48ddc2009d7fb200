//! Decoder for Govee thermometer manufacturer data.
//!
//! Temperature and humidity share one 24-bit big-endian integer. Bit 23 is the
//! temperature sign; the remaining 23 bits `D` hold
//! `|temperature| * 10 * 1000 + humidity * 10`, so both quantities come out as
//! fixed-point tenths without any floating-point arithmetic.

use crate::measurement::Tenths;
use crate::model::Model;
use thiserror::Error;

/// Reserved reading meaning "no valid value". The sensor also emits it when
/// humidity reaches 100%, since that value does not fit the encoding.
pub const INVALID_READING: u32 = 0xFF_FFFF;

const NEGATIVE_FLAG: u32 = 0x80_0000;
const MAGNITUDE_MASK: u32 = 0x7F_FFFF;

/// Error types for decoding Govee manufacturer data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Advertisement carried no manufacturer data at all
    #[error("advertisement has no manufacturer data")]
    MissingManufacturerData,
    /// Manufacturer data shorter than the model's layout requires
    #[error("{model} payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        model: Model,
        expected: usize,
        actual: usize,
    },
    /// The reserved 0xFFFFFF reading
    #[error("{0} reported invalid reading 0xffffff (humidity may be at 100%)")]
    InvalidReading(Model),
    /// Battery byte outside 0-100
    #[error("{model} battery out of range: expected 0-100, got {value}")]
    BatteryOutOfRange { model: Model, value: u8 },
}

/// Physical values decoded from one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Temperature in tenths of a degree Celsius
    pub temperature: Tenths,
    /// Relative humidity in tenths of a percent
    pub humidity: Tenths,
    /// Battery level in percent, for models that report it
    pub battery: Option<u8>,
}

/// Decode a model's manufacturer data (company id already stripped).
pub fn decode(model: Model, data: &[u8]) -> Result<Reading, DecodeError> {
    let layout = model.layout();
    let expected = layout.min_len();
    if data.len() < expected {
        return Err(DecodeError::TooShort {
            model,
            expected,
            actual: data.len(),
        });
    }

    let at = layout.reading_offset;
    let raw = u32::from_be_bytes([0, data[at], data[at + 1], data[at + 2]]);
    if raw == INVALID_READING {
        return Err(DecodeError::InvalidReading(model));
    }

    let magnitude = raw & MAGNITUDE_MASK;
    let sign = if raw & NEGATIVE_FLAG != 0 { -1 } else { 1 };
    // magnitude < 2^23, so both quotients fit in i32
    let temperature = Tenths((magnitude / 1000) as i32 * sign);
    let humidity = Tenths((magnitude % 1000) as i32);

    let battery = match layout.battery_offset {
        Some(offset) => {
            let value = data[offset];
            if value > 100 {
                return Err(DecodeError::BatteryOutOfRange { model, value });
            }
            Some(value)
        }
        None => None,
    };

    Ok(Reading {
        temperature,
        humidity,
        battery,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{encode_reading, hex};

    #[test]
    fn test_h5072_positive_temperature() {
        let reading = decode(Model::H5072, &hex("0103aecd39")).unwrap();
        assert_eq!(
            reading,
            Reading {
                temperature: Tenths(241),
                humidity: Tenths(357),
                battery: Some(57),
            }
        );
    }

    #[test]
    fn test_h5072_sign_flips_temperature_only() {
        let reading = decode(Model::H5072, &hex("0183aecd39")).unwrap();
        assert_eq!(reading.temperature, Tenths(-241));
        assert_eq!(reading.humidity, Tenths(357));
        assert_eq!(reading.battery, Some(57));
    }

    #[test]
    fn test_h5105_layout() {
        let positive = decode(Model::H5105, &hex("010103aecd")).unwrap();
        assert_eq!(positive.temperature, Tenths(241));
        assert_eq!(positive.humidity, Tenths(357));
        assert_eq!(positive.battery, None);

        let negative = decode(Model::H5105, &hex("010183aecd")).unwrap();
        assert_eq!(negative.temperature, Tenths(-241));
        assert_eq!(negative.humidity, Tenths(357));
        assert_eq!(negative.battery, None);
    }

    #[test]
    fn test_invalid_reading_rejected_for_both_layouts() {
        assert_eq!(
            decode(Model::H5072, &hex("01ffffff39")),
            Err(DecodeError::InvalidReading(Model::H5072))
        );
        assert_eq!(
            decode(Model::H5105, &hex("0101ffffff")),
            Err(DecodeError::InvalidReading(Model::H5105))
        );
    }

    #[test]
    fn test_short_payload_rejected() {
        assert_eq!(
            decode(Model::H5072, &hex("0103aecd")),
            Err(DecodeError::TooShort {
                model: Model::H5072,
                expected: 5,
                actual: 4,
            })
        );
        assert!(matches!(
            decode(Model::H5105, &[]),
            Err(DecodeError::TooShort { actual: 0, .. })
        ));
    }

    #[test]
    fn test_battery_out_of_range_rejected() {
        assert_eq!(
            decode(Model::H5072, &hex("0103aecd65")),
            Err(DecodeError::BatteryOutOfRange {
                model: Model::H5072,
                value: 101,
            })
        );
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let reading = decode(Model::H5072, &hex("0103aecd39ff00")).unwrap();
        assert_eq!(reading.temperature, Tenths(241));
    }

    #[test]
    fn test_decode_inverts_encode() {
        let cases = [(0, 0), (-1, 999), (-400, 0), (600, 995), (215, 483), (-99, 1)];
        for (temperature, humidity) in cases {
            let bytes = encode_reading(temperature, humidity);
            let mut payload = vec![0x01];
            payload.extend_from_slice(&bytes);
            payload.push(80);

            let reading = decode(Model::H5072, &payload).unwrap();
            assert_eq!(reading.temperature, Tenths(temperature));
            assert_eq!(reading.humidity, Tenths(humidity));
        }
    }
}
