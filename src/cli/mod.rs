// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! CLI module using clap derive.
//!
//! # Command Structure
//!
//! ```text
//! pipemux [global options] <command>
//! version
//! options
//! run [run options] [--] PROGRAM [ARGS]...
//! ```

pub mod global;
pub mod run;

#[cfg(test)]
mod tests;

use crate::cli::global::GlobalOptions;
use crate::cli::run::RunArgs;
use clap::{Parser, Subcommand};

/// Child process output multiplexer.
///
/// Runs a program and streams its stdout and stderr concurrently, in the
/// foreground or as a background job.
#[derive(Debug, Parser)]
#[command(
    name = "pipemux",
    author,
    version,
    about = "Child process output multiplexer",
    long_about = "pipemux Copyright (C) 2026 Romeo Ahmed\n\
                  This program comes with ABSOLUTELY NO WARRANTY\n\
                  This is free software, and you are welcome to redistribute it\n\
                  under certain conditions; see LICENSE for details.\n\n\
                  Runs a program and streams its stdout and stderr as they are\n\
                  produced, optionally batched, merged or tagged.\n\n\
                  Invoking `pipemux run -- make -j8` runs make in the foreground.\n\
                  See `pipemux <command> --help` for more information about a command.",
    after_help = "CONFIG FILES:\n\n\
                  By default, pipemux loads `pipemux.toml` from the current directory\n\
                  if it exists. Additional files can be given with --ini and are\n\
                  loaded after it. PIPEMUX_SECTION__KEY environment variables and\n\
                  --set overrides are applied last. Use --no-default-inis to only\n\
                  use --ini."
)]
pub struct Cli {
    /// Global options shared by all commands
    #[command(flatten)]
    pub global: GlobalOptions,

    /// Command to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shows the version.
    #[command(visible_alias = "-v")]
    Version,

    /// Lists all options and their effective values.
    Options,

    /// Runs a program and multiplexes its output.
    Run(RunArgs),
}

/// Parses command-line arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

/// Parses command-line arguments from an iterator.
pub fn parse_from<I, T>(iter: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::parse_from(iter)
}

/// Tries to parse command-line arguments, returning an error on failure.
///
/// # Errors
///
/// Returns a `clap::Error` if the arguments are invalid or if help/version information
/// was requested.
pub fn try_parse() -> Result<Cli, clap::Error> {
    Cli::try_parse()
}
