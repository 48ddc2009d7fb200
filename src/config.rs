//! Configuration: TOML file, command-line overrides and run modes.

use crate::ingest::EnqueueRetry;
use crate::model::Model;
use crate::registry::{Registry, RegistryError, SensorConfig, zip_sensor_lists};
use crate::throttle::parse_duration;
use crate::uplink::UplinkConfig;
use clap::Parser;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid sensor configuration: {0}")]
    Registry(#[from] RegistryError),
}

/// Which parts of the pipeline this process runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Scan, buffer and upload in one process
    #[default]
    All,
    /// Scan and buffer only
    Collect,
    /// Upload a buffer written by another process
    Upload,
}

impl Mode {
    pub fn scans(self) -> bool {
        matches!(self, Mode::All | Mode::Collect)
    }

    pub fn uploads(self) -> bool {
        matches!(self, Mode::All | Mode::Upload)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Sensors to monitor.
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    #[serde(default)]
    pub buffer: BufferConfig,

    /// Remote sink. Required by modes that upload.
    #[serde(default)]
    pub influxdb: Option<InfluxDbConfig>,

    #[serde(default)]
    pub uplink: UplinkSettings,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferConfig {
    /// SQLite file holding pending records.
    #[serde(default = "default_buffer_path")]
    pub path: PathBuf,

    /// How long a buffer call waits on a lock held elsewhere.
    #[serde(default = "default_buffer_timeout", deserialize_with = "duration")]
    pub timeout: Duration,
}

fn default_buffer_path() -> PathBuf {
    PathBuf::from("data/pending-thermometer-records.sqlite")
}

fn default_buffer_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            path: default_buffer_path(),
            timeout: default_buffer_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InfluxDbConfig {
    pub url: String,

    /// API token; may instead come from `--influxdb-token`.
    #[serde(default)]
    pub token: String,

    pub org: String,

    pub bucket: String,

    /// Bucket for `pending_record` points.
    #[serde(default)]
    pub derived_bucket: Option<String>,

    #[serde(default = "default_request_timeout", deserialize_with = "duration")]
    pub timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UplinkSettings {
    #[serde(default = "default_uplink_interval", deserialize_with = "duration")]
    pub interval: Duration,

    /// Records per write; a record becomes three or four points.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_uplink_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_batch_size() -> usize {
    5000
}

impl Default for UplinkSettings {
    fn default() -> Self {
        Self {
            interval: default_uplink_interval(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Keep at most one record per sensor per interval.
    #[serde(default, deserialize_with = "optional_duration")]
    pub throttle: Option<Duration>,

    #[serde(default = "default_enqueue_attempts")]
    pub enqueue_attempts: u32,

    #[serde(default = "default_enqueue_backoff", deserialize_with = "duration")]
    pub enqueue_backoff: Duration,

    /// Advertisements queued between the scanner and the ingester.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_enqueue_attempts() -> u32 {
    3
}

fn default_enqueue_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            throttle: None,
            enqueue_attempts: default_enqueue_attempts(),
            enqueue_backoff: default_enqueue_backoff(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl IngestConfig {
    pub fn retry(&self) -> EnqueueRetry {
        EnqueueRetry {
            attempts: self.enqueue_attempts,
            backoff: self.enqueue_backoff,
        }
    }
}

/// Either a number of seconds or a string like `"500ms"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Secs(u64),
    Text(String),
}

impl DurationValue {
    fn into_duration(self) -> Result<Duration, String> {
        match self {
            DurationValue::Secs(secs) => Ok(Duration::from_secs(secs)),
            DurationValue::Text(text) => parse_duration(&text),
        }
    }
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    DurationValue::deserialize(deserializer)?
        .into_duration()
        .map_err(serde::de::Error::custom)
}

fn optional_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    duration(deserializer).map(Some)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check that everything `mode` needs is present and sane.
    pub fn validate(&self, mode: Mode) -> Result<(), ConfigError> {
        if mode.scans() {
            self.registry()?;
            if self.ingest.enqueue_attempts == 0 {
                return Err(ConfigError::Invalid(
                    "ingest.enqueue_attempts must be at least 1".into(),
                ));
            }
            if self.ingest.channel_capacity == 0 {
                return Err(ConfigError::Invalid(
                    "ingest.channel_capacity must be positive".into(),
                ));
            }
        }

        if mode.uploads() {
            let influxdb = self.influxdb()?;
            if !(influxdb.url.starts_with("http://") || influxdb.url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "influxdb.url must be an http(s) URL, got {:?}",
                    influxdb.url
                )));
            }
            for (name, value) in [
                ("org", &influxdb.org),
                ("bucket", &influxdb.bucket),
                ("token", &influxdb.token),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!("influxdb.{name} is empty")));
                }
            }
            if influxdb.derived_bucket.as_deref() == Some(influxdb.bucket.as_str()) {
                return Err(ConfigError::Invalid(
                    "influxdb.derived_bucket must differ from influxdb.bucket".into(),
                ));
            }
            if self.uplink.batch_size == 0 {
                return Err(ConfigError::Invalid(
                    "uplink.batch_size must be positive".into(),
                ));
            }
            if self.uplink.interval.is_zero() {
                return Err(ConfigError::Invalid(
                    "uplink.interval must be positive".into(),
                ));
            }
        }

        Ok(())
    }

    /// Build the sensor registry.
    pub fn registry(&self) -> Result<Registry, ConfigError> {
        Ok(Registry::new(&self.sensors)?)
    }

    pub fn influxdb(&self) -> Result<&InfluxDbConfig, ConfigError> {
        self.influxdb
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("missing [influxdb] section".into()))
    }

    /// Drainer settings for the configured sink.
    pub fn uplink_config(&self) -> Result<UplinkConfig, ConfigError> {
        let influxdb = self.influxdb()?;
        Ok(UplinkConfig {
            interval: self.uplink.interval,
            batch_size: self.uplink.batch_size,
            bucket: influxdb.bucket.clone(),
            derived_bucket: influxdb.derived_bucket.clone(),
        })
    }
}

/// Command-line options.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// TOML configuration file.
    #[arg(short, long, env = "GOVEE_LOGGER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Which parts of the pipeline to run.
    #[arg(long, default_value_t, value_enum)]
    pub mode: Mode,

    /// InfluxDB API token, overriding the configuration file.
    #[arg(long, env = "INFLUXDB_TOKEN", hide_env_values = true)]
    pub influxdb_token: Option<String>,

    /// Throttle records per sensor to at most one per interval.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = parse_duration)]
    pub throttle: Option<Duration>,

    /// Sensor BLE name or MAC address. Repeat together with --nickname and
    /// --model to replace the sensors in the configuration file.
    #[arg(long = "device-name", value_name = "IDENTITY")]
    pub device_names: Vec<String>,

    /// Sensor nickname, paired positionally with --device-name.
    #[arg(long = "nickname")]
    pub nicknames: Vec<String>,

    /// Sensor model, paired positionally with --device-name.
    #[arg(long = "model")]
    pub models: Vec<Model>,

    /// Verbose logging (debug level unless RUST_LOG is set)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    pub check_config: bool,
}

impl Options {
    /// Load the configuration file (if any), apply command-line overrides and
    /// validate the result for the selected mode.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if !(self.device_names.is_empty() && self.nicknames.is_empty() && self.models.is_empty())
        {
            config.sensors = zip_sensor_lists(&self.device_names, &self.nicknames, &self.models)?;
        }
        if let Some(token) = &self.influxdb_token
            && let Some(influxdb) = config.influxdb.as_mut()
        {
            influxdb.token = token.clone();
        }
        if self.throttle.is_some() {
            config.ingest.throttle = self.throttle;
        }

        config.validate(self.mode)?;
        Ok(config)
    }
}
