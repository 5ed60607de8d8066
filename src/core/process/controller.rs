// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Control over a spawned child.
//!
//! ```text
//! ProcessControl (trait)
//!   take_sources() --> (LineSource stdout, LineSource stderr)   once
//!   has_exited() / exit_code()
//!   kill()  --> BoxFuture    no-op once exited
//!   wait()  --> BoxFuture    exit code, cached
//!
//! ProcessHandle: tokio::process::Child, kill_on_drop
//! ```

use futures_util::future::BoxFuture;
use std::process::ExitStatus;
use tokio::process::Child;
use tracing::{debug, trace};

use crate::error::ProcessError;
use crate::stream::LineSource;

/// What the multiplexer and the job worker need from a child process.
///
/// Async methods return boxed futures so the trait stays object safe.
pub trait ProcessControl: Send {
    /// Display name for logging.
    fn name(&self) -> &str;

    /// Hands over the stdout and stderr sources.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::StreamsTaken`] on every call after the first,
    /// and when the child's output was not piped.
    fn take_sources(&mut self) -> Result<(LineSource, LineSource), ProcessError>;

    /// Returns true once the child has exited; never blocks.
    fn has_exited(&mut self) -> bool;

    /// Exit code, once known.
    fn exit_code(&self) -> Option<i32>;

    /// Kills the child and reaps it. Does nothing if it already exited.
    fn kill(&mut self) -> BoxFuture<'_, Result<(), ProcessError>>;

    /// Waits for the child to exit and returns its exit code.
    fn wait(&mut self) -> BoxFuture<'_, Result<i32, ProcessError>>;
}

/// A running (or finished) child spawned by
/// [`ProcessBuilder::spawn`](super::builder::ProcessBuilder::spawn).
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    child: Child,
    sources: Option<(LineSource, LineSource)>,
    exit_code: Option<i32>,
}

impl ProcessHandle {
    pub(super) const fn new(
        name: String,
        child: Child,
        sources: Option<(LineSource, LineSource)>,
    ) -> Self {
        Self {
            name,
            child,
            sources,
            exit_code: None,
        }
    }

    /// OS process id while the child is running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn record(&mut self, status: ExitStatus) -> i32 {
        let code = status.code().unwrap_or(-1);
        if self.exit_code.is_none() {
            trace!(process = %self.name, exit_code = code, "exited");
        }
        self.exit_code = Some(code);
        code
    }
}

impl ProcessControl for ProcessHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn take_sources(&mut self) -> Result<(LineSource, LineSource), ProcessError> {
        self.sources.take().ok_or_else(|| ProcessError::StreamsTaken {
            name: self.name.clone(),
        })
    }

    fn has_exited(&mut self) -> bool {
        if self.exit_code.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.record(status);
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<(), ProcessError>> {
        Box::pin(async move {
            if self.has_exited() {
                return Ok(());
            }
            debug!(process = %self.name, "kill");
            if let Err(source) = self.child.start_kill() {
                // Lost the race against a natural exit
                if self.has_exited() {
                    return Ok(());
                }
                return Err(ProcessError::KillFailed {
                    name: self.name.clone(),
                    source,
                });
            }
            self.wait().await.map(|_| ())
        })
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<i32, ProcessError>> {
        Box::pin(async move {
            if let Some(code) = self.exit_code {
                return Ok(code);
            }
            let status = self
                .child
                .wait()
                .await
                .map_err(|source| ProcessError::WaitFailed {
                    name: self.name.clone(),
                    source,
                })?;
            Ok(self.record(status))
        })
    }
}
