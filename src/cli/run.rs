// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Run command arguments.
//!
//! # Flag Effects
//!
//! ```text
//! --buffer-size N   redirect.buffer_size  (1 = line by line)
//! --merge           redirect.merge        stderr joins the output channel
//! --wrap            redirect.wrap         tag lines with their stream
//! --no-redirect     redirect.dont_redirect (conflicts with --background)
//! --background      redirect.blocking=false
//! --format FMT      redirect.format
//!
//! --name, --timeout, --cwd, --stdin, --shell apply to this run only
//! ```

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::stream::OutputFormat;
use crate::utility::encoding::Encoding;

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Lines per flushed batch; 1 writes every line as soon as it arrives.
    #[arg(short = 'b', long = "buffer-size", value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub buffer_size: Option<u64>,

    /// Sends stderr lines to the output channel.
    #[arg(short = 'm', long)]
    pub merge: bool,

    /// Tags every line with the stream it came from.
    #[arg(short = 'w', long)]
    pub wrap: bool,

    /// Lets the child write to the terminal directly.
    #[arg(long = "no-redirect", conflicts_with = "background")]
    pub no_redirect: bool,

    /// Runs the child as a background job and streams its queues.
    #[arg(long)]
    pub background: bool,

    /// Job name (background only).
    #[arg(long, value_name = "NAME", requires = "background")]
    pub name: Option<String>,

    /// Stops the child after this many seconds.
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output rendering: text or json.
    #[arg(short = 'f', long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Decoding of the child's stdout.
    #[arg(long = "stdout-encoding", value_name = "ENCODING")]
    pub stdout_encoding: Option<Encoding>,

    /// Decoding of the child's stderr.
    #[arg(long = "stderr-encoding", value_name = "ENCODING")]
    pub stderr_encoding: Option<Encoding>,

    /// Working directory of the child.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Text written to the child's stdin.
    #[arg(long, value_name = "TEXT")]
    pub stdin: Option<String>,

    /// Runs PROGRAM as a command line through the system shell.
    #[arg(long, conflicts_with = "args")]
    pub shell: bool,

    /// Program to run.
    #[arg(value_name = "PROGRAM", required = true)]
    pub program: String,

    /// Arguments passed to the program.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl RunArgs {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Converts run arguments to configuration overrides.
    #[must_use]
    pub fn to_config_overrides(&self) -> Vec<String> {
        let flags = [
            (self.merge, "redirect/merge=true"),
            (self.wrap, "redirect/wrap=true"),
            (self.no_redirect, "redirect/dont_redirect=true"),
            (self.background, "redirect/blocking=false"),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .map(|(_, entry)| entry.to_string());

        let values = [
            self.buffer_size
                .map(|n| format!("redirect/buffer_size={n}")),
            self.format.map(|f| format!("redirect/format={f}")),
            self.stdout_encoding
                .map(|e| format!("redirect/stdout_encoding={e}")),
            self.stderr_encoding
                .map(|e| format!("redirect/stderr_encoding={e}")),
        ]
        .into_iter()
        .flatten();

        flags.chain(values).collect()
    }
}
