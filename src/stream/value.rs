// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Packaged values handed to a [`Sink`](super::Sink).
//!
//! ```text
//! Emission (output channel / Output queue)
//!   Line("text")                  raw
//!   Tagged{stream, line}          wrap
//!   Error(ErrorRecord)            error record on the output channel
//!   Batch([..])                   one buffer flush
//!
//! ErrorRecord (error channel / Error queue)
//!   { category, message, target? }
//! ```

use serde::Serialize;

use super::StreamKind;

/// A line carrying the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedLine {
    pub stream: StreamKind,
    pub line: String,
}

impl TaggedLine {
    pub fn new(stream: StreamKind, line: impl Into<String>) -> Self {
        Self {
            stream,
            line: line.into(),
        }
    }
}

/// Why an [`ErrorRecord`] exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Data written by the child to stderr.
    StdErr,
    /// A pipe read failed while a background job was running.
    StreamFault,
    /// The background worker died.
    JobFailed,
}

/// Structured error value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    category: ErrorCategory,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<Box<Emission>>,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            target: None,
        }
    }

    /// A record for one stderr line.
    pub fn stderr(line: impl Into<String>) -> Self {
        Self::new(ErrorCategory::StdErr, line)
    }

    /// A single record for a flushed stderr buffer; the lines are joined.
    #[must_use]
    pub fn batch(items: Vec<Emission>) -> Self {
        let message = items
            .iter()
            .map(Emission::text)
            .collect::<Vec<_>>()
            .join("\n");
        Self::stderr(message).with_target(Emission::Batch(items))
    }

    /// Attaches the value this record was built from.
    #[must_use]
    pub fn with_target(mut self, target: Emission) -> Self {
        self.target = Some(Box::new(target));
        self
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn target(&self) -> Option<&Emission> {
        self.target.as_deref()
    }
}

/// A value emitted to the output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Emission {
    Line(String),
    Tagged(TaggedLine),
    Error(ErrorRecord),
    Batch(Vec<Emission>),
}

impl Emission {
    /// Number of child lines this value carries.
    #[must_use]
    pub fn line_count(&self) -> usize {
        match self {
            Self::Batch(items) => items.iter().map(Self::line_count).sum(),
            Self::Error(record) => record.target().map_or(1, Self::line_count),
            Self::Line(_) | Self::Tagged(_) => 1,
        }
    }

    /// The stream this value is known to come from, if it says so.
    #[must_use]
    pub fn origin(&self) -> Option<StreamKind> {
        match self {
            Self::Tagged(tagged) => Some(tagged.stream),
            Self::Error(record) => match record.target() {
                Some(target) => target.origin(),
                None => Some(StreamKind::Error),
            },
            Self::Line(_) | Self::Batch(_) => None,
        }
    }

    /// Plain text of the value, one line per carried line.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Line(line) => line.clone(),
            Self::Tagged(tagged) => tagged.line.clone(),
            Self::Error(record) => record.message.clone(),
            Self::Batch(items) => items.iter().map(Self::text).collect::<Vec<_>>().join("\n"),
        }
    }

    /// Converts the value into something the error channel accepts.
    #[must_use]
    pub fn into_error_record(self) -> ErrorRecord {
        match self {
            Self::Error(record) => record,
            other => ErrorRecord::stderr(other.text()).with_target(other),
        }
    }
}
