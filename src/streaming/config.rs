//! Streaming configuration surface.
//!
//! Recognized keys (with an optional `streaming.` or `streaming:` prefix):
//!
//! | key | values |
//! |---|---|
//! | `type` | `auto`, `tiled`, `stripped`, `none` |
//! | `sizemode` | `auto`, `nbsplits`, `height` |
//! | `sizevalue` | integer ≥ 0 |
//! | `ram` | integer MB ≥ 0, 0 = platform default |
//! | `bias` | float ≥ 1.0 |
//!
//! Bad values never fail a write: they become
//! [`StreamingWarning::Configuration`] and the default is used.

use crate::core::error::ConfigError;
use crate::streaming::manager::{StreamingManager, StreamingWarning};
use crate::streaming::strategy::StreamingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable overriding the platform default RAM budget (MB).
pub const RAM_HINT_ENV: &str = "STRATA_MAX_RAM_HINT";

/// Default RAM budget when nothing else is configured.
pub const DEFAULT_RAM_MB: u64 = 256;

/// Platform default RAM budget in MB.
pub fn platform_default_ram_mb() -> u64 {
    std::env::var(RAM_HINT_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&mb| mb > 0)
        .unwrap_or(DEFAULT_RAM_MB)
}

/// `streaming.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingType {
    #[default]
    Auto,
    Tiled,
    Stripped,
    None,
}

impl FromStr for StreamingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(StreamingType::Auto),
            "tiled" => Ok(StreamingType::Tiled),
            "stripped" => Ok(StreamingType::Stripped),
            "none" => Ok(StreamingType::None),
            other => Err(format!(
                "unknown streaming type '{}' (expected auto, tiled, stripped or none)",
                other
            )),
        }
    }
}

impl fmt::Display for StreamingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamingType::Auto => "auto",
            StreamingType::Tiled => "tiled",
            StreamingType::Stripped => "stripped",
            StreamingType::None => "none",
        };
        write!(f, "{}", name)
    }
}

/// `streaming.sizemode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeMode {
    #[default]
    Auto,
    Nbsplits,
    Height,
}

impl FromStr for SizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(SizeMode::Auto),
            "nbsplits" => Ok(SizeMode::Nbsplits),
            "height" => Ok(SizeMode::Height),
            other => Err(format!(
                "unknown streaming size mode '{}' (expected auto, nbsplits or height)",
                other
            )),
        }
    }
}

/// Streaming options as read from key/value pairs, TOML or an extended filename.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingOptions {
    #[serde(rename = "type")]
    pub streaming_type: Option<StreamingType>,
    pub sizemode: Option<SizeMode>,
    pub sizevalue: Option<u64>,
    pub ram: Option<u64>,
    pub bias: Option<f64>,
}

impl StreamingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no option was given.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set one option from its textual form.
    ///
    /// Returns a warning when the key is unknown or the value invalid; the
    /// option is then left untouched.
    pub fn set(&mut self, key: &str, value: &str) -> Option<StreamingWarning> {
        let key = key.trim();
        let short = key
            .strip_prefix("streaming.")
            .or_else(|| key.strip_prefix("streaming:"))
            .unwrap_or(key);
        let value = value.trim();

        let result: Result<(), String> = match short {
            "type" => value.parse().map(|t| self.streaming_type = Some(t)),
            "sizemode" => value.parse().map(|m| self.sizemode = Some(m)),
            "sizevalue" => parse_u64(value).map(|v| self.sizevalue = Some(v)),
            "ram" => parse_u64(value).map(|v| self.ram = Some(v)),
            "bias" => value
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", value))
                .map(|b| self.bias = Some(b)),
            _ => Err("unknown streaming option".to_string()),
        };

        result
            .err()
            .map(|reason| StreamingWarning::configuration(format!("{}={}: {}", key, value, reason)))
    }

    /// Build options from key/value pairs, collecting warnings.
    pub fn from_pairs<'a, I>(pairs: I) -> (Self, Vec<StreamingWarning>)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut options = Self::new();
        let warnings = pairs
            .into_iter()
            .filter_map(|(k, v)| options.set(k, v))
            .collect();
        (options, warnings)
    }

    /// Read the `[streaming]` table of a TOML document.
    ///
    /// A document that does not parse is an error; bad entries are warnings.
    pub fn from_toml_str(document: &str) -> Result<(Self, Vec<StreamingWarning>), ConfigError> {
        let table: toml::Table = document.parse()?;
        let mut options = Self::new();
        let mut warnings = Vec::new();

        let Some(streaming) = table.get("streaming") else {
            return Ok((options, warnings));
        };
        let Some(streaming) = streaming.as_table() else {
            return Err(ConfigError::Toml("'streaming' must be a table".to_string()));
        };

        for (key, value) in streaming {
            let text = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                other => other.to_string(),
            };
            warnings.extend(options.set(key, &text));
        }
        Ok((options, warnings))
    }

    /// Strategy selected by the options, if a type was given.
    pub fn to_strategy(&self) -> (Option<StreamingStrategy>, Vec<StreamingWarning>) {
        let mut warnings = Vec::new();

        let Some(streaming_type) = self.streaming_type else {
            if !self.is_empty() {
                warnings.push(StreamingWarning::configuration(
                    "streaming options without streaming.type are ignored",
                ));
            }
            return (None, warnings);
        };

        let mut bias = self.bias.unwrap_or(1.0);
        if !(bias >= 1.0) {
            warnings.push(StreamingWarning::configuration(format!(
                "streaming.bias {} is below 1.0, using 1.0",
                bias
            )));
            bias = 1.0;
        }
        let sizemode = self.sizemode.unwrap_or_default();
        let ram_mb = self.sizevalue.or(self.ram).unwrap_or(0);
        let size = self.sizevalue.unwrap_or(0);

        let strategy = match (streaming_type, sizemode) {
            (StreamingType::Auto, mode) => {
                if self.sizemode.is_some() && mode != SizeMode::Auto {
                    warnings.push(StreamingWarning::configuration(
                        "streaming.sizemode is ignored with streaming.type=auto",
                    ));
                }
                let ram_mb = if mode == SizeMode::Auto {
                    ram_mb
                } else {
                    self.ram.unwrap_or(0)
                };
                StreamingStrategy::RamAdaptive { ram_mb, bias }
            }
            (StreamingType::Tiled, SizeMode::Auto) => StreamingStrategy::RamTiled { ram_mb, bias },
            (StreamingType::Tiled, SizeMode::Nbsplits) => {
                StreamingStrategy::NumberOfDivisionsTiled { divisions: size }
            }
            (StreamingType::Tiled, SizeMode::Height) => {
                StreamingStrategy::TileDimension { dimension: size }
            }
            (StreamingType::Stripped, SizeMode::Auto) => {
                StreamingStrategy::RamStripped { ram_mb, bias }
            }
            (StreamingType::Stripped, SizeMode::Nbsplits) => {
                StreamingStrategy::NumberOfDivisionsStripped { divisions: size }
            }
            (StreamingType::Stripped, SizeMode::Height) => {
                StreamingStrategy::LinesPerStrip { lines: size }
            }
            (StreamingType::None, _) => {
                if self.sizemode.is_some() || self.sizevalue.is_some() {
                    warnings.push(StreamingWarning::configuration(
                        "streaming.sizemode and streaming.sizevalue are ignored with streaming.type=none",
                    ));
                }
                StreamingStrategy::NumberOfDivisionsStripped { divisions: 1 }
            }
        };
        (Some(strategy), warnings)
    }

    /// Apply the options to a manager, returning the warnings met.
    ///
    /// `streaming.ram` also becomes the manager's default budget.
    pub fn apply(&self, manager: &mut StreamingManager) -> Vec<StreamingWarning> {
        if let Some(ram) = self.ram.filter(|&r| r > 0) {
            manager.set_default_ram(ram);
        }
        let (strategy, warnings) = self.to_strategy();
        if let Some(strategy) = strategy {
            manager.set_strategy(strategy);
        }
        warnings
    }
}

fn parse_u64(value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("'{}' is not a non-negative integer", value))
}
