// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! The task that runs one job's multiplexer.
//!
//! ```text
//! spawn(supervisor)
//!   └─ spawn(run)                     JoinError::is_panic --> Failed + JobFailed record
//!        take_sources
//!        select! {
//!          mux.run(JobSink)  Ok  --> select! {
//!                                      wait child, record exit code --> Completed
//!                                      token.cancelled() --> kill child --> Stopped
//!                                    }
//!                            Err --> StreamFault record, kill child --> Failed
//!          token.cancelled()     --> kill child
//!                                    drain (bounded by drain_timeout, warn on expiry)
//!                                    --> Stopped
//!        }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::queue::JobSink;
use super::{JobShared, JobState};
use crate::core::process::ProcessControl;
use crate::stream::{ErrorCategory, ErrorRecord, Multiplexer, RedirectionPolicy};

/// Everything the worker takes ownership of when a job starts.
pub(super) struct Launch {
    pub process: Box<dyn ProcessControl>,
    pub policy: RedirectionPolicy,
    pub channel_capacity: usize,
    pub drain_timeout: Duration,
}

/// Spawns the worker and a supervisor turning a panic into `Failed`.
pub(super) fn spawn(shared: Arc<JobShared>, name: String, launch: Launch) {
    let worker = tokio::spawn(run(Arc::clone(&shared), name.clone(), launch));
    tokio::spawn(async move {
        if let Err(e) = worker.await {
            error!(job = %name, error = %e, "worker died");
            shared.fail(ErrorRecord::new(
                ErrorCategory::JobFailed,
                format!("worker of job '{name}' died: {e}"),
            ));
        }
    });
}

async fn run(shared: Arc<JobShared>, name: String, launch: Launch) {
    let Launch {
        mut process,
        policy,
        channel_capacity,
        drain_timeout,
    } = launch;

    shared
        .queues
        .verbose
        .push(format!("job '{name}' started: {}", process.name()));

    let (stdout, stderr) = match process.take_sources() {
        Ok(sources) => sources,
        Err(e) => {
            shared.fail(ErrorRecord::new(ErrorCategory::StreamFault, e.to_string()));
            return;
        }
    };

    let mut sink = JobSink::new(Arc::clone(&shared.queues), shared.token.clone());
    let mux = Multiplexer::new(stdout, stderr, policy).with_channel_capacity(channel_capacity);
    let drained = mux.run(&mut sink);
    tokio::pin!(drained);

    let finished = tokio::select! {
        biased;
        () = shared.token.cancelled() => None,
        result = &mut drained => Some(result),
    };

    match finished {
        Some(Ok(stats)) => {
            debug!(job = %name, ?stats, "streams drained");
            let waited = tokio::select! {
                biased;
                () = shared.token.cancelled() => None,
                result = process.wait() => Some(result),
            };
            match waited {
                Some(Ok(code)) => {
                    shared.record_exit_code(code);
                    shared
                        .queues
                        .verbose
                        .push(format!("process '{}' exited with code {code}", process.name()));
                    shared.transition(JobState::Running, JobState::Completed);
                }
                Some(Err(e)) => {
                    shared.fail(ErrorRecord::new(ErrorCategory::StreamFault, e.to_string()));
                }
                None => {
                    info!(job = %name, "stopping after streams closed");
                    if let Err(e) = process.kill().await {
                        warn!(job = %name, error = %e, "failed to kill process");
                    }
                    if let Some(code) = process.exit_code() {
                        shared.record_exit_code(code);
                    }
                    shared.transition(JobState::Running, JobState::Stopped);
                }
            }
        }
        Some(Err(e)) => {
            warn!(job = %name, error = %e, "stream fault");
            if let Err(kill) = process.kill().await {
                warn!(job = %name, error = %kill, "failed to kill process");
            }
            shared.fail(ErrorRecord::new(ErrorCategory::StreamFault, e.to_string()));
        }
        None => {
            info!(job = %name, "stopping");
            if let Err(e) = process.kill().await {
                warn!(job = %name, error = %e, "failed to kill process");
            }
            if tokio::time::timeout(drain_timeout, &mut drained).await.is_err() {
                warn!(job = %name, timeout = ?drain_timeout, "streams still open after kill");
                shared.queues.warning.push(format!(
                    "output of job '{name}' did not close within {drain_timeout:?} after kill"
                ));
            }
            if let Some(code) = process.exit_code() {
                shared.record_exit_code(code);
            }
            shared.transition(JobState::Running, JobState::Stopped);
        }
    }
}
