// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! The `run` command.
//!
//! ```text
//! RunArgs + Config
//!   --> ProcessBuilder (which / raw, cwd, stdin, encodings)
//!   --> blocking:   run_blocking(handle, DirectSink::stdio)
//!       background: spawn_background --> JobRegistry
//!                   drain output/error/verbose/warning queues live
//!                   until the job is terminal
//!   Ctrl-C / --timeout --> cancel (foreground) or stop (background)
//!   --> exit code
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::cli::run::RunArgs;
use crate::config::Config;
use crate::core::process::{ProcessBuilder, ProcessHandle};
use crate::error::Result;
use crate::job::registry::JobRegistry;
use crate::job::{Job, JobState};
use crate::runner::{run_blocking, spawn_background};
use crate::stream::{DirectSink, Sink};

/// Exit code reported when the child was killed on request.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Exit code reported for a background job that failed.
pub const FAILED_EXIT_CODE: i32 = 1;

/// Run a program and multiplex its output.
///
/// Returns the exit code the binary should report.
///
/// # Errors
///
/// Returns an error if the program cannot be found or spawned, or if
/// multiplexing fails.
pub async fn run_run_command(args: &RunArgs, config: &Config) -> Result<i32> {
    let handle = build_process(args, config)?
        .spawn()
        .with_context(|| format!("failed to start '{}'", args.program))?;

    let token = CancellationToken::new();
    let _signals = cancel_on_signal(token.clone(), args.timeout());

    if config.redirect.blocking {
        run_foreground(handle, config, &token).await
    } else {
        run_background(handle, args.name.as_deref(), config, &token).await
    }
}

fn build_process(args: &RunArgs, config: &Config) -> Result<ProcessBuilder> {
    let mut builder = if args.shell {
        ProcessBuilder::raw(args.program.as_str()).name("shell")
    } else if Path::new(&args.program).components().count() == 1 {
        ProcessBuilder::which(&args.program)?
            .name(args.program.as_str())
            .args(&args.args)
    } else {
        ProcessBuilder::new(&args.program).args(&args.args)
    };

    builder = builder
        .stdout_encoding(config.redirect.stdout_encoding)
        .stderr_encoding(config.redirect.stderr_encoding);
    if let Some(cwd) = &args.cwd {
        builder = builder.cwd(cwd);
    }
    if let Some(stdin) = &args.stdin {
        builder = builder.stdin(stdin.as_str());
    }
    if config.redirect.dont_redirect {
        builder = builder.inherit_stdio();
    }
    Ok(builder)
}

/// Cancels `token` on Ctrl-C or once `timeout` has elapsed.
///
/// The watcher stops when the returned handle is dropped.
fn cancel_on_signal(token: CancellationToken, timeout: Option<Duration>) -> AbortOnDropHandle<()> {
    AbortOnDropHandle::new(tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                    return;
                }
                info!("interrupted");
            }
            () = deadline => warn!(?timeout, "timeout reached"),
        }
        token.cancel();
    }))
}

async fn run_foreground(
    mut handle: ProcessHandle,
    config: &Config,
    token: &CancellationToken,
) -> Result<i32> {
    let mut sink = DirectSink::stdio(config.redirect.format);
    let outcome = run_blocking(&mut handle, &config.run_options(), &mut sink, token).await?;
    debug!(
        exit_code = outcome.exit_code,
        output_lines = outcome.stats.output_lines,
        error_lines = outcome.stats.error_lines,
        flushes = outcome.stats.flushes,
        "foreground run finished"
    );

    Ok(if outcome.interrupted {
        INTERRUPTED_EXIT_CODE
    } else {
        outcome.exit_code
    })
}

async fn run_background(
    handle: ProcessHandle,
    name: Option<&str>,
    config: &Config,
    token: &CancellationToken,
) -> Result<i32> {
    let mut registry = JobRegistry::new();
    let id = registry.insert(spawn_background(handle, &config.run_options(), name)?);
    let job = registry.get(id)?;
    info!(job = %job.name(), id = %id, command = %job.command(), "job started");

    let mut sink = DirectSink::stdio(config.redirect.format);
    stream_job(job, &mut sink, token).await?;

    let info = registry.remove(id, true)?;
    debug!(
        job = %info.name,
        summary = %serde_json::to_string(&info).unwrap_or_default(),
        "job finished"
    );

    Ok(match info.state {
        JobState::Completed => info.exit_code.unwrap_or(FAILED_EXIT_CODE),
        JobState::Stopped => INTERRUPTED_EXIT_CODE,
        _ => FAILED_EXIT_CODE,
    })
}

/// Forwards a job's queues to `sink` until the job is terminal and drained.
///
/// Cancelling `token` stops the job; its remaining output is still forwarded.
///
/// # Errors
///
/// Returns a stream error if the sink refuses a value.
pub async fn stream_job<S: Sink + ?Sized>(
    job: &Job,
    sink: &mut S,
    token: &CancellationToken,
) -> Result<JobState> {
    let mut state = job.subscribe();
    let mut stop_sent = false;

    loop {
        tokio::select! {
            biased;
            () = token.cancelled(), if !stop_sent => {
                stop_sent = true;
                if let Err(e) = job.stop() {
                    debug!(job = %job.name(), error = %e, "job already finished");
                }
            }
            Some(value) = job.output().recv() => sink.emit_output(value)?,
            Some(record) = job.errors().recv() => sink.emit_error(record)?,
            Some(line) = job.verbose().recv() => info!(job = %job.name(), "{line}"),
            Some(line) = job.warnings().recv() => warn!(job = %job.name(), "{line}"),
            _ = state.wait_for(|s| s.is_terminal()) => break,
        }
    }

    for value in job.output().drain() {
        sink.emit_output(value)?;
    }
    for record in job.errors().drain() {
        sink.emit_error(record)?;
    }
    for line in job.verbose().drain() {
        info!(job = %job.name(), "{line}");
    }
    for line in job.warnings().drain() {
        warn!(job = %job.name(), "{line}");
    }

    Ok(job.state())
}
