//! Registry of monitored sensors.
//!
//! Maps a BLE identity (advertised device name or MAC address) to the
//! configured logical sensor. Built once at startup and read-only afterwards.
//! A failed lookup is the common case: the scanner sees every nearby device.

use crate::mac_address::MacAddress;
use crate::model::Model;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a sensor is recognized in advertisements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Advertised local name, e.g. `GVH5072_7705`
    Name(String),
    /// Advertiser address
    Mac(MacAddress),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Name(name) => f.write_str(name),
            Identity::Mac(mac) => write!(f, "{mac}"),
        }
    }
}

impl FromStr for Identity {
    type Err = RegistryError;

    /// Strings that parse as a MAC address become [`Identity::Mac`]; anything
    /// else non-empty is a device name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RegistryError::InvalidIdentity(s.to_string()));
        }
        Ok(match s.parse::<MacAddress>() {
            Ok(mac) => Identity::Mac(mac),
            Err(_) => Identity::Name(s.to_string()),
        })
    }
}

/// One sensor as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    pub identity: String,
    pub nickname: String,
    pub model: Model,
}

/// A configured, monitored sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSensor {
    pub identity: Identity,
    pub nickname: String,
    pub model: Model,
}

/// Errors raised while building the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no sensors configured")]
    Empty,
    #[error("duplicate sensor identity: {0}")]
    Duplicate(Identity),
    #[error("invalid sensor identity: {0:?}")]
    InvalidIdentity(String),
    #[error("sensor {0} has an empty nickname")]
    EmptyNickname(Identity),
    #[error("control character in sensor {field}: {value:?}")]
    ControlCharacter { field: &'static str, value: String },
    #[error(
        "sensor lists differ in length: {identities} identities, {nicknames} nicknames, {models} models"
    )]
    MismatchedLengths {
        identities: usize,
        nicknames: usize,
        models: usize,
    },
}

/// Zip parallel identity/nickname/model lists into sensor entries.
pub fn zip_sensor_lists(
    identities: &[String],
    nicknames: &[String],
    models: &[Model],
) -> Result<Vec<SensorConfig>, RegistryError> {
    if identities.len() != nicknames.len() || identities.len() != models.len() {
        return Err(RegistryError::MismatchedLengths {
            identities: identities.len(),
            nicknames: nicknames.len(),
            models: models.len(),
        });
    }

    Ok(identities
        .iter()
        .zip(nicknames)
        .zip(models)
        .map(|((identity, nickname), model)| SensorConfig {
            identity: identity.clone(),
            nickname: nickname.clone(),
            model: *model,
        })
        .collect())
}

/// Identities and nicknames become line protocol tag values, which have no
/// escape for line breaks.
fn reject_control_characters(field: &'static str, value: &str) -> Result<(), RegistryError> {
    if value.chars().any(char::is_control) {
        return Err(RegistryError::ControlCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Lookup table from advertisement identity to logical sensor.
#[derive(Debug, Clone)]
pub struct Registry {
    sensors: Vec<LogicalSensor>,
    by_name: HashMap<String, usize>,
    by_mac: HashMap<MacAddress, usize>,
}

impl Registry {
    /// Build the registry, rejecting empty and duplicate configurations.
    pub fn new(configs: &[SensorConfig]) -> Result<Self, RegistryError> {
        if configs.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut registry = Registry {
            sensors: Vec::with_capacity(configs.len()),
            by_name: HashMap::new(),
            by_mac: HashMap::new(),
        };

        for config in configs {
            reject_control_characters("identity", &config.identity)?;
            reject_control_characters("nickname", &config.nickname)?;
            let identity: Identity = config.identity.parse()?;
            if config.nickname.trim().is_empty() {
                return Err(RegistryError::EmptyNickname(identity));
            }

            let index = registry.sensors.len();
            let inserted = match &identity {
                Identity::Name(name) => registry.by_name.insert(name.clone(), index),
                Identity::Mac(mac) => registry.by_mac.insert(*mac, index),
            };
            if inserted.is_some() {
                return Err(RegistryError::Duplicate(identity));
            }

            registry.sensors.push(LogicalSensor {
                identity,
                nickname: config.nickname.clone(),
                model: config.model,
            });
        }

        Ok(registry)
    }

    pub fn lookup(&self, identity: &Identity) -> Option<&LogicalSensor> {
        let index = match identity {
            Identity::Name(name) => self.by_name.get(name.as_str()),
            Identity::Mac(mac) => self.by_mac.get(mac),
        }?;
        self.sensors.get(*index)
    }

    /// Resolve an advertisement by its advertised name first, then its address.
    pub fn lookup_advertiser(&self, name: Option<&str>, mac: MacAddress) -> Option<&LogicalSensor> {
        name.and_then(|name| self.by_name.get(name))
            .or_else(|| self.by_mac.get(&mac))
            .and_then(|index| self.sensors.get(*index))
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogicalSensor> {
        self.sensors.iter()
    }
}
