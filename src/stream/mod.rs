// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Output stream multiplexing.
//!
//! ```text
//!   LineSource x2 ──> Multiplexer ──> Sink
//!                         |            ├─ DirectSink (foreground)
//!                  RedirectionPolicy   └─ JobSink    (background)
//!                  WrapKind / Target / BufferRef
//! ```
//!
//! # Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`LineSource`] | One child pipe read line by line |
//! | [`RedirectionPolicy`] | Precomputed packaging and destination per stream |
//! | [`Multiplexer`] | Races both sources, batches, flushes to a sink |
//! | [`Sink`] | Emit-now vs emit-later destination |
//! | [`Emission`] / [`ErrorRecord`] | Values on the output / error channel |

pub mod mux;
pub mod policy;
pub mod sink;
pub mod source;
pub mod value;

#[cfg(test)]
mod tests;

pub use mux::{MuxStats, Multiplexer};
pub use policy::{BufferRef, RedirectOptions, RedirectionPolicy, Route, Target, WrapKind};
pub use sink::{DirectSink, OutputFormat, Sink};
pub use source::{LineSource, StreamKind};
pub use value::{Emission, ErrorCategory, ErrorRecord, TaggedLine};
