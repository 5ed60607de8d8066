// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Entry points tying a spawned process to the multiplexer.
//!
//! ```text
//! run_blocking(process, options, sink, token)       foreground
//!   dont_redirect --> wait (kill on cancel)
//!   otherwise     --> Multiplexer::run(sink) on this task
//!                     cancel: kill child, bounded drain
//!                 --> wait child (after both streams drained, kill on cancel)
//!                 --> RunOutcome { exit_code, interrupted, stats }
//!
//! spawn_background(process, options, name)          background
//!   --> Job over a JobSink, started
//! ```

use bon::Builder;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::process::ProcessControl;
use crate::error::{JobError, PipemuxResult};
use crate::job::{DEFAULT_DRAIN_TIMEOUT, Job};
use crate::stream::mux::DEFAULT_CHANNEL_CAPACITY;
use crate::stream::{MuxStats, Multiplexer, RedirectOptions, RedirectionPolicy, Sink};

/// Everything needed to run one child besides the child itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct RunOptions {
    /// Policy inputs.
    #[builder(setters(name = with_redirect), default)]
    redirect: RedirectOptions,
    /// The child writes to this process's stdout/stderr; nothing is multiplexed.
    #[builder(setters(name = with_dont_redirect), default = false)]
    dont_redirect: bool,
    #[builder(setters(name = with_channel_capacity), default = DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,
    /// How long to wait for the streams to close after a kill.
    #[builder(setters(name = with_drain_timeout), default = DEFAULT_DRAIN_TIMEOUT)]
    drain_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RunOptions {
    #[must_use]
    pub const fn redirect(&self) -> &RedirectOptions {
        &self.redirect
    }

    #[must_use]
    pub const fn dont_redirect(&self) -> bool {
        self.dont_redirect
    }

    #[must_use]
    pub const fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    #[must_use]
    pub fn policy(&self) -> RedirectionPolicy {
        RedirectionPolicy::compute(&self.redirect)
    }
}

/// Result of a foreground run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// The token fired and the child was killed.
    pub interrupted: bool,
    pub stats: MuxStats,
}

impl RunOutcome {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0 && !self.interrupted
    }
}

/// Multiplexes a child into `sink` on the calling task and returns its exit code.
///
/// The exit code is read only after both streams reached end-of-stream.
/// Cancelling `token` kills the child; the run still ends normally with
/// `interrupted` set.
///
/// # Errors
///
/// Returns a stream error if a pipe read or the sink fails (the child is
/// killed first), or a process error if the child cannot be killed or
/// waited for.
pub async fn run_blocking<P, S>(
    process: &mut P,
    options: &RunOptions,
    sink: &mut S,
    token: &CancellationToken,
) -> PipemuxResult<RunOutcome>
where
    P: ProcessControl + ?Sized,
    S: Sink + ?Sized,
{
    if options.dont_redirect() {
        return wait_unredirected(process, token).await;
    }

    let (stdout, stderr) = process.take_sources()?;
    let mux = Multiplexer::new(stdout, stderr, options.policy())
        .with_channel_capacity(options.channel_capacity());
    let drained = mux.run(sink);
    tokio::pin!(drained);

    let finished = tokio::select! {
        biased;
        result = &mut drained => Some(result),
        () = token.cancelled() => None,
    };

    let (result, interrupted) = match finished {
        Some(result) => (result, false),
        None => {
            warn!(process = %process.name(), "cancellation requested, terminating process");
            process.kill().await?;
            match tokio::time::timeout(options.drain_timeout(), &mut drained).await {
                Ok(result) => (result, true),
                Err(_) => {
                    warn!(
                        process = %process.name(),
                        timeout = ?options.drain_timeout(),
                        "streams still open after kill"
                    );
                    (Ok(MuxStats::default()), true)
                }
            }
        }
    };

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            if let Err(kill) = process.kill().await {
                warn!(process = %process.name(), error = %kill, "failed to kill process");
            }
            return Err(e.into());
        }
    };

    let (exit_code, interrupted) = if interrupted {
        (process.wait().await?, true)
    } else {
        wait_or_kill(process, token).await?
    };
    debug!(process = %process.name(), exit_code, interrupted, "run finished");
    Ok(RunOutcome {
        exit_code,
        interrupted,
        stats,
    })
}

async fn wait_unredirected<P>(process: &mut P, token: &CancellationToken) -> PipemuxResult<RunOutcome>
where
    P: ProcessControl + ?Sized,
{
    let (exit_code, interrupted) = wait_or_kill(process, token).await?;
    Ok(RunOutcome {
        exit_code,
        interrupted,
        stats: MuxStats::default(),
    })
}

/// Waits for the child; cancelling `token` kills it first.
///
/// Returns the exit code and whether the child was killed.
async fn wait_or_kill<P>(process: &mut P, token: &CancellationToken) -> PipemuxResult<(i32, bool)>
where
    P: ProcessControl + ?Sized,
{
    let waited = tokio::select! {
        result = process.wait() => Some(result),
        () = token.cancelled() => None,
    };

    match waited {
        Some(result) => Ok((result?, false)),
        None => {
            warn!(process = %process.name(), "cancellation requested, terminating process");
            process.kill().await?;
            Ok((process.wait().await?, true))
        }
    }
}

/// Starts a background job for the child.
///
/// Must be called inside a tokio runtime.
///
/// # Errors
///
/// Returns [`JobError::InvalidState`] if the freshly created job cannot start.
pub fn spawn_background(
    process: impl ProcessControl + 'static,
    options: &RunOptions,
    name: Option<&str>,
) -> Result<Job, JobError> {
    let mut job = Job::new(process, options.policy())
        .with_channel_capacity(options.channel_capacity())
        .with_drain_timeout(options.drain_timeout());
    if let Some(name) = name {
        job = job.with_name(name);
    }
    job.start()?;
    Ok(job)
}
