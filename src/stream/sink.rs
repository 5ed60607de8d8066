// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Destinations for packaged lines.
//!
//! ```text
//! Sink
//!   emit_output(Emission)
//!   emit_error(ErrorRecord)
//!     |
//!     +-- DirectSink<O, E>   caller's writers, synchronous (foreground)
//!     +-- JobSink            background job queues (see crate::job)
//! ```

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use super::value::{Emission, ErrorRecord};
use crate::error::{ConfigError, StreamError};

/// Destination for emissions produced by the multiplexer.
pub trait Sink {
    /// Emits a value on the output channel.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Sink`] if the destination refuses the value.
    fn emit_output(&mut self, value: Emission) -> Result<(), StreamError>;

    /// Emits a record on the error channel.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Sink`] if the destination refuses the record.
    fn emit_error(&mut self, record: ErrorRecord) -> Result<(), StreamError>;
}

/// How the direct sink renders values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One line of text per child line; tagged lines get a `[stdout]`/`[stderr]` prefix.
    #[default]
    Text,
    /// One JSON document per emission.
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                section: "redirect".to_string(),
                key: "format".to_string(),
                message: format!("expected 'text' or 'json', got '{s}'"),
            }),
        }
    }
}

/// Writes emissions straight to the caller's output and error writers.
///
/// Every emission is flushed immediately so the caller sees lines in real time.
#[derive(Debug)]
pub struct DirectSink<O, E> {
    out: O,
    err: E,
    format: OutputFormat,
}

impl DirectSink<io::Stdout, io::Stderr> {
    /// Sink over the current process's stdout/stderr.
    #[must_use]
    pub fn stdio(format: OutputFormat) -> Self {
        Self::new(io::stdout(), io::stderr(), format)
    }
}

impl<O: Write, E: Write> DirectSink<O, E> {
    pub const fn new(out: O, err: E, format: OutputFormat) -> Self {
        Self { out, err, format }
    }

    /// Returns the writers.
    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

impl<O: Write, E: Write> Sink for DirectSink<O, E> {
    fn emit_output(&mut self, value: Emission) -> Result<(), StreamError> {
        write_value(&mut self.out, self.format, &value).map_err(|source| StreamError::Sink {
            channel: "output",
            source,
        })
    }

    fn emit_error(&mut self, record: ErrorRecord) -> Result<(), StreamError> {
        let result = match self.format {
            OutputFormat::Text => writeln!(self.err, "{}", record.message()),
            OutputFormat::Json => write_json(&mut self.err, &record),
        };
        result
            .and_then(|()| self.err.flush())
            .map_err(|source| StreamError::Sink {
                channel: "error",
                source,
            })
    }
}

fn write_value<W: Write>(w: &mut W, format: OutputFormat, value: &Emission) -> io::Result<()> {
    match format {
        OutputFormat::Text => write_text(w, value)?,
        OutputFormat::Json => write_json(w, value)?,
    }
    w.flush()
}

fn write_json<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *w, value)?;
    w.write_all(b"\n")
}

fn write_text<W: Write>(w: &mut W, value: &Emission) -> io::Result<()> {
    match value {
        Emission::Line(line) => writeln!(w, "{line}"),
        Emission::Tagged(tagged) => writeln!(w, "[{}] {}", tagged.stream, tagged.line),
        Emission::Error(record) => match record.target() {
            Some(target) => write_text(w, target),
            None => writeln!(w, "{}", record.message()),
        },
        Emission::Batch(items) => items.iter().try_for_each(|item| write_text(w, item)),
    }
}
