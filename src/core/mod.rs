// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Core modules for process management.
//!
//! ```text
//!        core
//!          |
//!          v
//!       process
//!          |
//!   ProcessBuilder --spawn--> ProcessHandle
//!                             impl ProcessControl
//! ```

pub mod process;
