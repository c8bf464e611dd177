// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Save destinations and naming options consulted by [`Saver`](crate::Saver).

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sanitize::UnsanitizablePolicy;

/// Environment variable naming the configuration file read by
/// [`SaveConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "LABSAVE_CONFIG";

pub const DEFAULT_EXTENSION: &str = "lsv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Destination {
    pub directory: PathBuf,
}

/// Resolution of the timestamp put in front of container file names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    /// `YYYY-MM-DD_HHMMSS_`
    #[default]
    Seconds,
    /// `YYYY-MM-DD_`
    Day,
}

/// Where and how a run is saved.
///
/// The JSON form is either the full structure or, for compatibility with
/// plain destination files, a bare mapping of destination key to
/// `{"directory": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaveConfig {
    pub destinations: IndexMap<String, Destination>,
    pub extension: String,
    pub timestamp: TimestampMode,
    pub unsanitizable: UnsanitizablePolicy,
}

impl Default for SaveConfig {
    fn default() -> Self {
        SaveConfig {
            destinations: IndexMap::new(),
            extension: DEFAULT_EXTENSION.to_string(),
            timestamp: TimestampMode::default(),
            unsanitizable: UnsanitizablePolicy::default(),
        }
    }
}

impl SaveConfig {
    pub fn with_destination(mut self, key: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        self.destinations.insert(
            key.into(),
            Destination {
                directory: directory.into(),
            },
        );
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        match serde_json::from_str::<SaveConfig>(json) {
            Ok(config) => Ok(config),
            Err(err) => match serde_json::from_str::<IndexMap<String, Destination>>(json) {
                Ok(destinations) => Ok(SaveConfig {
                    destinations,
                    ..Default::default()
                }),
                Err(_) => Err(err.into()),
            },
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|err| {
            Error::new(format!("cannot read configuration '{}': {err}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Load the file named by the `LABSAVE_CONFIG` environment variable.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(path),
            None => Err(Error::new(format!("{CONFIG_ENV_VAR} is not set"))),
        }
    }
}
