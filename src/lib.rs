//! `govee-logger` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup
//! and process exit codes. The pipeline itself lives in [`crate::app`], where
//! it can be tested deterministically with an injected scanner, sink and
//! buffer.

pub mod app;
pub mod buffer;
pub mod config;
pub mod decode;
pub mod ingest;
pub mod mac_address;
pub mod measurement;
pub mod model;
pub mod output;
pub mod registry;
pub mod scanner;
pub mod throttle;
pub mod uplink;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{RunError, Supervisor};
pub use buffer::{BufferError, Enqueued, IngestionBuffer, PendingEntry};
pub use config::{Config, ConfigError, Mode, Options};
pub use decode::{DecodeError, Reading, decode};
pub use mac_address::MacAddress;
pub use measurement::{MeasurementRecord, Tenths};
pub use model::Model;
pub use output::influxdb::InfluxDbClient;
pub use output::{Sink, SinkError};
pub use registry::{Identity, LogicalSensor, Registry, RegistryError, SensorConfig};
pub use scanner::{Advertisement, BluezScanner, Forwarder, ScanError, Scanner};
pub use throttle::{Throttle, parse_duration};
pub use uplink::{DrainError, DrainOutcome, DrainState, Drainer, UplinkConfig};
