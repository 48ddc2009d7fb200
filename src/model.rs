//! Supported Govee thermometer models.
//!
//! The models share one reading encoding but place it at different offsets
//! inside the manufacturer data, and only some of them report battery level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Govee thermometer/hygrometer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    /// Reports temperature, humidity and battery.
    H5072,
    /// Reports temperature and humidity only; its frame omits the report-count byte.
    H5105,
}

/// Byte positions of the fields inside a model's manufacturer data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Offset of the 3-byte big-endian temperature/humidity reading
    pub reading_offset: usize,
    /// Offset of the battery percent byte, if the model reports it
    pub battery_offset: Option<usize>,
}

impl Layout {
    /// Minimum manufacturer data length needed to decode every field.
    pub fn min_len(&self) -> usize {
        let reading_end = self.reading_offset + 3;
        match self.battery_offset {
            Some(offset) => reading_end.max(offset + 1),
            None => reading_end,
        }
    }
}

impl Model {
    pub const ALL: [Model; 2] = [Model::H5072, Model::H5105];

    pub const fn layout(self) -> Layout {
        match self {
            Model::H5072 => Layout {
                reading_offset: 1,
                battery_offset: Some(4),
            },
            Model::H5105 => Layout {
                reading_offset: 2,
                battery_offset: None,
            },
        }
    }

    pub const fn reports_battery(self) -> bool {
        self.layout().battery_offset.is_some()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Model::H5072 => "H5072",
            Model::H5105 => "H5105",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown model '{0}' (supported: H5072, H5105)")]
pub struct ParseModelError(pub String);

impl FromStr for Model {
    type Err = ParseModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .into_iter()
            .find(|model| model.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseModelError(s.to_string()))
    }
}
