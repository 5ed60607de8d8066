// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration management.
//!
//! # Configuration Hierarchy
//!
//! ```text
//! Priority (low → high)
//! 1. defaults
//! 2. pipemux.toml (cwd, optional)
//! 3. --ini FILE (repeatable)
//! 4. PIPEMUX_* env vars
//! 5. --set / CLI overrides
//! ```
//!
//! # Environment Variable Mapping
//!
//! ```text
//! PIPEMUX_REDIRECT__BUFFER_SIZE=1     → redirect.buffer_size = 1
//! PIPEMUX_REDIRECT__MERGE=true        → redirect.merge = true
//! PIPEMUX_GLOBAL__OUTPUT_LOG_LEVEL=4  → global.output_log_level = 4
//! ```

pub mod loader;
pub mod types;


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::runner::RunOptions;
use crate::stream::RedirectOptions;

use loader::ConfigLoader;
use types::{GlobalConfig, RedirectConfig};

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Global options.
    pub global: GlobalConfig,
    /// Multiplexing defaults.
    pub redirect: RedirectConfig,
}

impl Config {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pipemux::config::Config;
    ///
    /// let config = Config::builder()
    ///     .add_toml_file_optional("pipemux.toml")
    ///     .with_env_prefix("PIPEMUX")
    ///     .build()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    #[must_use]
    pub fn builder() -> ConfigLoader {
        ConfigLoader::new()
    }

    /// Load configuration from a single TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid TOML, or
    /// does not match the `Config` structure.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::builder().add_toml_file(path).build()
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML or does not match the
    /// `Config` structure.
    pub fn parse(content: &str) -> Result<Self> {
        Self::builder().add_toml_str(content).build()
    }

    /// Validates values serde accepts but the runner cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending key.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.redirect.validate()
    }

    /// Policy inputs for a foreground run.
    #[must_use]
    pub fn redirect_options(&self) -> RedirectOptions {
        RedirectOptions::builder()
            .with_buffer_size(self.redirect.buffer_size)
            .with_merge(self.redirect.merge)
            .with_wrap(self.redirect.wrap)
            .build()
    }

    /// Runner options built from the `[redirect]` section.
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions::builder()
            .with_redirect(self.redirect_options())
            .with_dont_redirect(self.redirect.dont_redirect)
            .with_channel_capacity(self.redirect.channel_capacity)
            .with_drain_timeout(self.redirect.drain_timeout())
            .build()
    }

    /// Format configuration options for display.
    ///
    /// Output is deterministically ordered and the keys are aligned.
    #[must_use]
    pub fn format_options(&self) -> Vec<String> {
        let mut options = BTreeMap::new();
        self.format_global_options(&mut options);
        self.format_redirect_options(&mut options);

        let max_key_len = options.keys().map(String::len).max().unwrap_or(0);

        options
            .into_iter()
            .map(|(key, value)| format!("{key:<max_key_len$} = {value}"))
            .collect()
    }

    fn format_global_options(&self, options: &mut BTreeMap<String, String>) {
        options.insert(
            "global.output_log_level".into(),
            self.global.output_log_level.as_u8().to_string(),
        );
        options.insert(
            "global.file_log_level".into(),
            self.global.file_log_level.as_u8().to_string(),
        );
        options.insert(
            "global.log_file".into(),
            self.global
                .log_file
                .as_ref()
                .map_or_else(String::new, |p| p.display().to_string()),
        );
    }

    fn format_redirect_options(&self, options: &mut BTreeMap<String, String>) {
        let redirect = &self.redirect;
        let entries = [
            ("buffer_size", redirect.buffer_size.to_string()),
            ("merge", redirect.merge.to_string()),
            ("wrap", redirect.wrap.to_string()),
            ("dont_redirect", redirect.dont_redirect.to_string()),
            ("blocking", redirect.blocking.to_string()),
            ("channel_capacity", redirect.channel_capacity.to_string()),
            ("drain_timeout_ms", redirect.drain_timeout_ms.to_string()),
            ("format", redirect.format.to_string()),
            ("stdout_encoding", redirect.stdout_encoding.to_string()),
            ("stderr_encoding", redirect.stderr_encoding.to_string()),
        ];
        for (key, value) in entries {
            options.insert(format!("redirect.{key}"), value);
        }
    }
}
