// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Redirection policy: how each stream's lines are packaged and where they go.
//!
//! Computed once per invocation; the multiplexer only looks routes up.
//!
//! ```text
//! wrap  buffer  stdout                    stderr
//! ----  ------  ------------------------  -----------------------------------
//! no    >1      Raw -> out buffer         Raw -> err buffer
//! no    =1      Raw -> EmitOutput         ErrorRecord -> EmitError
//! yes   >1      TaggedOutput -> out buf   TaggedError -> err buffer
//! yes   =1      TaggedOutput -> EmitOut   TaggedErrorRecordForError -> EmitError
//!
//! merge: stderr keeps its WrapKind, takes stdout's target/buffer
//!        (TaggedErrorRecordForError becomes TaggedErrorRecordForOutput)
//! ```

use bon::Builder;

use super::StreamKind;
use super::value::{Emission, ErrorRecord, TaggedLine};

/// Default number of lines per flushed batch.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Inputs of the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct RedirectOptions {
    /// Lines per batch; 1 disables batching. Zero is treated as 1.
    #[builder(setters(name = with_buffer_size), default = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
    /// Send stderr lines to the output destination.
    #[builder(setters(name = with_merge), default = false)]
    merge: bool,
    /// Tag every value with its source stream.
    #[builder(setters(name = with_wrap), default = false)]
    wrap: bool,
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RedirectOptions {
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[must_use]
    pub const fn merge(&self) -> bool {
        self.merge
    }

    #[must_use]
    pub const fn wrap(&self) -> bool {
        self.wrap
    }
}

/// How a raw line is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapKind {
    Raw,
    TaggedOutput,
    TaggedError,
    ErrorRecord,
    /// Tagged stderr line as an error record travelling on the output channel.
    TaggedErrorRecordForOutput,
    /// Tagged stderr line as an error record for the error channel.
    TaggedErrorRecordForError,
}

impl WrapKind {
    /// Packages one line.
    #[must_use]
    pub fn package(self, line: String) -> Emission {
        match self {
            Self::Raw => Emission::Line(line),
            Self::TaggedOutput => Emission::Tagged(TaggedLine::new(StreamKind::Output, line)),
            Self::TaggedError => Emission::Tagged(TaggedLine::new(StreamKind::Error, line)),
            Self::ErrorRecord => Emission::Error(ErrorRecord::stderr(line)),
            Self::TaggedErrorRecordForOutput | Self::TaggedErrorRecordForError => {
                let tagged = Emission::Tagged(TaggedLine::new(StreamKind::Error, line.clone()));
                Emission::Error(ErrorRecord::stderr(line).with_target(tagged))
            }
        }
    }
}

/// Logical batch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRef {
    Output,
    Error,
}

impl BufferRef {
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Output => 0,
            Self::Error => 1,
        }
    }
}

/// Destination of a packaged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    EmitOutput,
    EmitError,
    AppendToBuffer(BufferRef),
}

/// Packaging and destination for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub wrap: WrapKind,
    pub target: Target,
}

/// Per-stream routes plus the shared batch capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectionPolicy {
    routes: [Route; 2],
    capacity: usize,
}

impl RedirectionPolicy {
    /// Evaluates the policy table for the given options.
    #[must_use]
    pub fn compute(options: &RedirectOptions) -> Self {
        let capacity = options.buffer_size().max(1);
        let batching = capacity > 1;

        let output = match (options.wrap(), batching) {
            (false, true) => Route {
                wrap: WrapKind::Raw,
                target: Target::AppendToBuffer(BufferRef::Output),
            },
            (false, false) => Route {
                wrap: WrapKind::Raw,
                target: Target::EmitOutput,
            },
            (true, true) => Route {
                wrap: WrapKind::TaggedOutput,
                target: Target::AppendToBuffer(BufferRef::Output),
            },
            (true, false) => Route {
                wrap: WrapKind::TaggedOutput,
                target: Target::EmitOutput,
            },
        };

        let error_wrap = match (options.wrap(), batching) {
            (false, true) => WrapKind::Raw,
            (false, false) => WrapKind::ErrorRecord,
            (true, true) => WrapKind::TaggedError,
            (true, false) if options.merge() => WrapKind::TaggedErrorRecordForOutput,
            (true, false) => WrapKind::TaggedErrorRecordForError,
        };
        let error_target = if options.merge() {
            output.target
        } else if batching {
            Target::AppendToBuffer(BufferRef::Error)
        } else {
            Target::EmitError
        };

        Self {
            routes: [
                output,
                Route {
                    wrap: error_wrap,
                    target: error_target,
                },
            ],
            capacity,
        }
    }

    #[must_use]
    pub const fn route(&self, kind: StreamKind) -> Route {
        self.routes[kind.index()]
    }

    /// Lines per batch (1 when batching is off).
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn is_batching(&self) -> bool {
        self.capacity > 1
    }

    /// Whether both streams share one destination.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.routes[0].target == self.routes[1].target
    }
}

impl Default for RedirectionPolicy {
    fn default() -> Self {
        Self::compute(&RedirectOptions::default())
    }
}
