// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Error handling module.
//!
//! ```text
//!          PipemuxError (~24 bytes)
//!                  |
//!   +------+-------+-------+------+------+
//!   |      |       |       |      |      |
//!   v      v       v       v      v      v
//!  Cfg   Proc   Stream    Job    Io   Other
//!  Box   Box     Box      Box    Box  Box<str>
//!
//! Sub-errors (unboxed internally):
//!   Config  ParseError, MissingKey, InvalidValue
//!   Process ExecutableNotFound, SpawnFailed, StreamsTaken, KillFailed, WaitFailed
//!   Stream  Read (StreamFault), Sink
//!   Job     InvalidState, NotFound, StillRunning
//!
//! All variants boxed => PipemuxError fits in 24 bytes.
//! ```

use thiserror::Error;

use crate::job::JobState;
use crate::stream::StreamKind;

/// Convenience alias for `anyhow::Result`.
pub type Result<T> = anyhow::Result<T>;

/// Result type using [`PipemuxError`].
pub type PipemuxResult<T> = std::result::Result<T, PipemuxError>;

/// Top-level application error type.
///
/// All sub-errors are boxed to keep this enum at ~24 bytes on the stack.
#[derive(Debug, Error)]
pub enum PipemuxError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] Box<ConfigError>),

    /// Process control error.
    #[error("process error: {0}")]
    Process(#[from] Box<ProcessError>),

    /// Output stream error.
    #[error("stream error: {0}")]
    Stream(#[from] Box<StreamError>),

    /// Background job error.
    #[error("job error: {0}")]
    Job(#[from] Box<JobError>),

    /// I/O error.
    #[error("io error: {0}")]
    Io(Box<std::io::Error>),

    /// Generic error with message.
    #[error("{0}")]
    Other(Box<str>),
}

// --- From implementations for boxing ---

/// Macro to generate `From` implementations that box the source error.
macro_rules! impl_from_boxed {
    ($($error:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$error> for PipemuxError {
                fn from(err: $error) -> Self {
                    PipemuxError::$variant(Box::new(err))
                }
            }
        )+
    };
}

impl_from_boxed! {
    ConfigError => Config,
    ProcessError => Process,
    StreamError => Stream,
    JobError => Job,
    std::io::Error => Io,
}

// --- Config Errors ---

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },

    /// Missing required configuration key.
    #[error("missing required config key '{key}' in section '[{section}]'")]
    MissingKey { section: String, key: String },

    /// Invalid configuration value.
    #[error("invalid value for '{key}' in section '[{section}]': {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },
}

// --- Process Errors ---

/// Process control errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Executable not found in PATH.
    #[error("executable not found: '{name}' (not in PATH)")]
    ExecutableNotFound { name: String },

    /// Failed to spawn process.
    #[error("failed to spawn process '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The output streams were already handed to a multiplexer, or never piped.
    #[error("output streams of process '{name}' are not available")]
    StreamsTaken { name: String },

    /// Failed to kill the process.
    #[error("failed to kill process '{name}': {source}")]
    KillFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the process to exit failed.
    #[error("failed to wait for process '{name}': {source}")]
    WaitFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

// --- Stream Errors ---

/// Errors raised while multiplexing the output streams.
///
/// A line on stderr is data, never one of these.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Reading from one of the child's pipes failed.
    #[error("failed to read {stream}: {source}")]
    Read {
        stream: StreamKind,
        #[source]
        source: std::io::Error,
    },

    /// The sink refused an emission (closed pipe, dropped queue).
    #[error("failed to emit to {channel} channel: {source}")]
    Sink {
        channel: &'static str,
        #[source]
        source: std::io::Error,
    },
}

// --- Job Errors ---

/// Background job errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Operation not allowed in the job's current state.
    #[error("cannot {operation} job {id}: state is {actual}, expected {expected}")]
    InvalidState {
        id: u64,
        operation: &'static str,
        expected: JobState,
        actual: JobState,
    },

    /// No job with this id is registered.
    #[error("job {0} not found")]
    NotFound(u64),

    /// Job is still running and removal was not forced.
    #[error("job {id} ('{name}') is still running")]
    StillRunning { id: u64, name: String },
}

#[cfg(test)]
mod tests;
