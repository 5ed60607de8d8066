// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Async process spawning and control.
//!
//! ```text
//! ProcessBuilder::new("cargo")
//!   .args() .cwd() .env() .stdin() .stdout_encoding()
//!   .spawn()
//!       --> tokio::process::Command (kill_on_drop)
//!           stdout/stderr piped, or inherited (inherit_stdio)
//!       --> ProcessHandle: ProcessControl
//!             take_sources / kill / wait / exit_code
//! ```

pub mod builder;
pub mod controller;

pub use builder::ProcessBuilder;
pub use controller::{ProcessControl, ProcessHandle};
