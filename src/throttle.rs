//! Per-sensor record throttling and duration parsing.
//!
//! Govee sensors advertise every couple of seconds. The throttle keeps at
//! most one record per sensor per interval so the buffer does not fill with
//! near-identical readings.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Limits records to one per `interval` for each sensor identity.
///
/// The first record from a sensor always passes.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_emitted: HashMap<String, Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_emitted: HashMap::new(),
        }
    }

    /// Whether a record from `identity` observed at `now` should be kept.
    /// Keeping a record restarts that sensor's interval.
    pub fn should_emit(&mut self, identity: &str, now: Instant) -> bool {
        if let Some(last) = self.last_emitted.get_mut(identity) {
            if now.saturating_duration_since(*last) < self.interval {
                return false;
            }
            *last = now;
            return true;
        }
        self.last_emitted.insert(identity.to_string(), now);
        true
    }
}

const UNITS: [(&str, u64); 4] = [("ms", 1), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)];

/// Parse a duration such as `500ms`, `10s`, `5m` or `2h`.
/// A bare number is seconds.
///
/// ```
/// use govee_logger::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("120").unwrap(), Duration::from_secs(120));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (number, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, millis)| src.strip_suffix(suffix).map(|n| (n, *millis)))
        .unwrap_or((src, 1_000));

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    value
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration out of range: {src}"))
}
