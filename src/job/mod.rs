// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Background jobs: a multiplexer running off the caller's task.
//!
//! # Architecture
//!
//! ```text
//!   caller                           worker (tokio task)
//!   ------                           -------------------
//!   Job::new(process, policy)
//!   start() ── NotStarted->Running ──> Multiplexer::run(JobSink)
//!                                            |
//!   output()/errors()  <──── JobQueues <─────+
//!   verbose()/warnings()                     |
//!   has_more_data()                          v
//!   wait() <──── watch::Receiver<JobState> Completed | Failed | Stopped
//!   stop() ── CancellationToken ──> kill child, bounded drain
//!   dispose()/Drop ── cancel + close queues
//! ```
//!
//! # Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Job`] | One background run with its state machine and queues |
//! | [`JobState`] | `NotStarted -> Running -> {Completed, Failed, Stopped}` |
//! | [`JobQueues`] | Output / Error / Verbose / Warning queues |
//! | [`JobSink`] | The sink the worker hands to the multiplexer |
//! | [`JobRegistry`] | Caller-owned create/list/find/remove |

pub mod queue;
pub mod registry;
mod worker;

#[cfg(test)]
pub(crate) mod test_utils;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::process::ProcessControl;
use crate::error::JobError;
use crate::stream::mux::DEFAULT_CHANNEL_CAPACITY;
use crate::stream::{Emission, ErrorRecord, RedirectionPolicy};

pub use queue::{JobQueues, JobSink, Queue};
pub use registry::JobRegistry;

/// Default time a stopped job waits for its streams to close after the kill.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Instance id of a job, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobState {
    NotStarted,
    Running,
    /// The multiplexer drained both streams.
    Completed,
    /// The worker hit a fault; the Error queue holds a record of it.
    Failed,
    /// Cancelled before natural completion.
    Stopped,
}

impl JobState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "NotStarted",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
        })
    }
}

/// State shared between a [`Job`] and its worker.
#[derive(Debug)]
struct JobShared {
    id: JobId,
    state: watch::Sender<JobState>,
    queues: Arc<JobQueues>,
    exit_code: OnceLock<i32>,
    token: CancellationToken,
}

impl JobShared {
    /// Moves `from -> to`; does nothing if the job is not in `from`.
    fn transition(&self, from: JobState, to: JobState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(job = %self.id, %from, %to, "transition");
        }
        changed
    }

    fn fail(&self, record: ErrorRecord) {
        self.queues.error.push(record);
        self.transition(JobState::Running, JobState::Failed);
    }

    fn record_exit_code(&self, code: i32) {
        let _ = self.exit_code.set(code);
    }
}

/// Point-in-time summary of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub command: String,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub has_more_data: bool,
}

/// A child process multiplexed on its own worker task.
///
/// The caller drains the queues while the job runs or after it finishes.
/// Dropping the job disposes it.
pub struct Job {
    id: JobId,
    name: String,
    command: String,
    shared: Arc<JobShared>,
    process: Option<Box<dyn ProcessControl>>,
    policy: RedirectionPolicy,
    channel_capacity: usize,
    drain_timeout: Duration,
}

impl Job {
    /// Creates a job over a spawned process. Nothing runs until [`start`](Self::start).
    pub fn new(process: impl ProcessControl + 'static, policy: RedirectionPolicy) -> Self {
        let id = JobId::next();
        let (state, _) = watch::channel(JobState::NotStarted);
        Self {
            id,
            name: format!("Job{id}"),
            command: process.name().to_string(),
            shared: Arc::new(JobShared {
                id,
                state,
                queues: Arc::new(JobQueues::new()),
                exit_code: OnceLock::new(),
                token: CancellationToken::new(),
            }),
            process: Some(Box::new(process)),
            policy,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name of the child process.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        *self.shared.state.borrow()
    }

    /// Exit code of the child, once the job knows it.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.shared.exit_code.get().copied()
    }

    /// Receiver observing every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn output(&self) -> &Queue<Emission> {
        &self.shared.queues.output
    }

    #[must_use]
    pub fn errors(&self) -> &Queue<ErrorRecord> {
        &self.shared.queues.error
    }

    #[must_use]
    pub fn verbose(&self) -> &Queue<String> {
        &self.shared.queues.verbose
    }

    #[must_use]
    pub fn warnings(&self) -> &Queue<String> {
        &self.shared.queues.warning
    }

    /// Whether any of the four queues holds an item right now.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.shared.queues.has_more_data()
    }

    #[must_use]
    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            name: self.name.clone(),
            command: self.command.clone(),
            state: self.state(),
            exit_code: self.exit_code(),
            has_more_data: self.has_more_data(),
        }
    }

    /// Starts the worker. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidState`] unless the job is `NotStarted`.
    pub fn start(&mut self) -> Result<(), JobError> {
        let Some(process) = self.process.take() else {
            return Err(self.invalid_state("start", JobState::NotStarted));
        };
        if !self.shared.transition(JobState::NotStarted, JobState::Running) {
            self.process = Some(process);
            return Err(self.invalid_state("start", JobState::NotStarted));
        }

        info!(job = %self.id, name = %self.name, command = %self.command, "job started");
        worker::spawn(
            Arc::clone(&self.shared),
            self.name.clone(),
            worker::Launch {
                process,
                policy: self.policy,
                channel_capacity: self.channel_capacity,
                drain_timeout: self.drain_timeout,
            },
        );
        Ok(())
    }

    /// Requests cancellation: the worker kills the child and ends `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidState`] unless the job is `Running`.
    pub fn stop(&self) -> Result<(), JobError> {
        if self.state() != JobState::Running {
            return Err(self.invalid_state("stop", JobState::Running));
        }
        info!(job = %self.id, name = %self.name, "stop requested");
        self.shared.token.cancel();
        Ok(())
    }

    /// Resolves with the terminal state.
    ///
    /// A job that is never started never resolves, unless it is disposed.
    pub async fn wait(&self) -> JobState {
        let mut rx = self.shared.state.subscribe();
        if let Ok(state) = rx.wait_for(|state| state.is_terminal()).await {
            return *state;
        }
        *rx.borrow()
    }

    /// Cancels the job and closes all four queues.
    ///
    /// Items already queued stay drainable. A job that never started ends
    /// `Stopped` and its child is released.
    pub fn dispose(&mut self) {
        self.shared.token.cancel();
        self.shared.queues.close_all();
        if self.process.take().is_some() {
            self.shared.transition(JobState::NotStarted, JobState::Stopped);
        }
    }

    fn invalid_state(&self, operation: &'static str, expected: JobState) -> JobError {
        JobError::InvalidState {
            id: self.id.get(),
            operation,
            expected,
            actual: self.state(),
        }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("command", &self.command)
            .field("state", &self.state())
            .field("started", &self.process.is_none())
            .finish_non_exhaustive()
    }
}
