// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration sections.
//!
//! ```text
//! Config: GlobalConfig   logging
//!         RedirectConfig multiplexing defaults for `run`
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::job::DEFAULT_DRAIN_TIMEOUT;
use crate::logging::LogLevel;
use crate::stream::OutputFormat;
use crate::stream::mux::DEFAULT_CHANNEL_CAPACITY;
use crate::stream::policy::DEFAULT_BUFFER_SIZE;
use crate::utility::encoding::Encoding;

/// Deserializes a value through its `FromStr` implementation.
fn from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}

/// Global configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Log level for console output on stderr (0-6).
    pub output_log_level: LogLevel,
    /// Log level for file output (0-6).
    pub file_log_level: LogLevel,
    /// Path to log file; no file logging when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            output_log_level: LogLevel::WARN,
            file_log_level: LogLevel::TRACE,
            log_file: None,
        }
    }
}

/// Defaults for how `run` multiplexes a child.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedirectConfig {
    /// Lines per flushed batch; 1 disables batching.
    pub buffer_size: usize,
    /// Send stderr lines to the output channel.
    pub merge: bool,
    /// Tag every line with its source stream.
    pub wrap: bool,
    /// Let the child write to this process's stdout/stderr directly.
    pub dont_redirect: bool,
    /// Run in the foreground; `false` runs the child as a background job.
    pub blocking: bool,
    /// Capacity of the fan-in channel between the readers and the multiplexer.
    pub channel_capacity: usize,
    /// How long to wait for the pipes to close after a kill.
    pub drain_timeout_ms: u64,
    /// Rendering of the direct sink.
    #[serde(deserialize_with = "from_str")]
    pub format: OutputFormat,
    #[serde(deserialize_with = "from_str")]
    pub stdout_encoding: Encoding,
    #[serde(deserialize_with = "from_str")]
    pub stderr_encoding: Encoding,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            merge: false,
            wrap: false,
            dont_redirect: false,
            blocking: true,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            drain_timeout_ms: u64::try_from(DEFAULT_DRAIN_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            format: OutputFormat::Text,
            stdout_encoding: Encoding::Unknown,
            stderr_encoding: Encoding::Unknown,
        }
    }
}

impl RedirectConfig {
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Checks the values serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero buffer size or channel
    /// capacity, or for an unredirected background run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("buffer_size", self.buffer_size),
            ("channel_capacity", self.channel_capacity),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    section: "redirect".to_string(),
                    key: key.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        if self.dont_redirect && !self.blocking {
            return Err(ConfigError::InvalidValue {
                section: "redirect".to_string(),
                key: "dont_redirect".to_string(),
                message: "a background job needs redirected output".to_string(),
            });
        }
        Ok(())
    }
}
