// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the executor crate.

use std::path::PathBuf;

/// Fatal errors ending an `execute` call.
///
/// Failures of the work itself never show up here.
#[derive(thiserror::Error, Debug)]
pub enum ExecuteError {
    /// The context was cancelled while waiting for a permit.
    #[error("Execution cancelled after {completed} of {total} invocations")]
    Cancelled {
        /// Invocations that finished before the abort.
        completed: usize,
        /// Invocations requested.
        total: usize,
    },

    /// The context deadline passed, or would have passed, while waiting for a permit.
    #[error("Deadline exceeded after {completed} of {total} invocations")]
    DeadlineExceeded {
        /// Invocations that finished before the abort.
        completed: usize,
        /// Invocations requested.
        total: usize,
    },

    /// The limiter rejected its configuration or a request.
    #[error("Rate limiter error: {0}")]
    Limiter(#[from] paced_ratelimit::Error),

    /// The executor configuration could not be loaded or is out of range.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ExecuteError {
    /// Classifies a failed permit wait.
    pub(crate) fn aborted(source: paced_ratelimit::Error, completed: usize, total: usize) -> Self {
        match source {
            paced_ratelimit::Error::Cancelled => ExecuteError::Cancelled { completed, total },
            paced_ratelimit::Error::DeadlineExceeded
            | paced_ratelimit::Error::WouldExceedDeadline { .. } => {
                ExecuteError::DeadlineExceeded { completed, total }
            }
            other => ExecuteError::Limiter(other),
        }
    }

    /// Returns true if the run was aborted by its context.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ExecuteError::Cancelled { .. } | ExecuteError::DeadlineExceeded { .. }
        )
    }

    /// Invocations that finished before an abort.
    pub fn completed(&self) -> Option<usize> {
        match self {
            ExecuteError::Cancelled { completed, .. }
            | ExecuteError::DeadlineExceeded { completed, .. } => Some(*completed),
            _ => None,
        }
    }
}

/// Errors raised while loading an executor configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// I/O error source
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid YAML for this schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
