// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration for a rate-limited run.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use paced_ratelimit::{Context, RateSpec};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ConfigError, ExecuteError};

/// Default admission rate.
const DEFAULT_RATE_PER_SECOND: u32 = 100_000;

/// Default number of invocations.
const DEFAULT_INVOCATIONS: usize = 1000;

/// How invocations are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One invocation at a time.
    Sequential,
    /// One task per invocation, all sharing the rate.
    #[default]
    Concurrent,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Sequential => f.write_str("sequential"),
            Mode::Concurrent => f.write_str("concurrent"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Mode::Sequential),
            "concurrent" => Ok(Mode::Concurrent),
            other => Err(format!(
                "unknown mode '{other}', expected 'sequential' or 'concurrent'"
            )),
        }
    }
}

/// Configuration for a rate-limited run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Maximum admissions per second, also the burst size.
    #[serde(default = "default_rate_per_second")]
    #[validate(range(min = 1))]
    pub rate_per_second: u32,

    /// Number of times the work is invoked.
    #[serde(default = "default_invocations")]
    pub invocations: usize,

    /// Dispatch mode.
    #[serde(default)]
    pub mode: Mode,

    /// Upper bound for the whole run. Becomes the context deadline.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            rate_per_second: DEFAULT_RATE_PER_SECOND,
            invocations: DEFAULT_INVOCATIONS,
            mode: Mode::default(),
            timeout: None,
        }
    }
}

impl ExecutorConfig {
    /// Parses and validates a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validated()
    }

    /// Reads, parses and validates a YAML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Returns the configuration if every field is in range.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// The admission rate.
    pub fn rate(&self) -> Result<RateSpec, ExecuteError> {
        Ok(RateSpec::new(self.rate_per_second)?)
    }

    /// Derives the run context, applying the timeout if one is set.
    pub fn context(&self, parent: &Context) -> Context {
        match self.timeout {
            Some(timeout) => parent.with_timeout(timeout),
            None => parent.clone(),
        }
    }
}

fn default_rate_per_second() -> u32 {
    DEFAULT_RATE_PER_SECOND
}

fn default_invocations() -> usize {
    DEFAULT_INVOCATIONS
}
