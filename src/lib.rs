// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Library root.
//!
//! # Crate Architecture
//!
//! ```text
//!                        main.rs
//!                           |
//!                +----------+----------+
//!                v                     v
//!             cli (clap)          cmd (handlers)
//!                |              options / run
//!                +----------+----------+
//!                           v
//!              ,---------------------------,
//!              |          config           |
//!              |   TOML, env, overrides    |
//!              '-------------+-------------'
//!                            v
//!              ,---------------------------,
//!              |          runner           |
//!              | run_blocking / background |
//!              '--+--------------------+---'
//!                 |                    |
//!                 v                    v
//!              stream                 job
//!         policy, mux, sinks   state, queues, registry
//!                 |
//!   +-------------+---------------------------+
//!   |  core   process builder / controller    |
//!   +-----------------------------------------+
//!   |  foundation   error, logging, utility   |
//!   +-----------------------------------------+
//! ```

pub mod cli;
pub mod cmd;
pub mod config;
pub mod core;
pub mod error;
pub mod job;
pub mod logging;
pub mod runner;
pub mod stream;
pub mod utility;
