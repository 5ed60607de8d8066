// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! The four queues of a background job and the sink feeding them.
//!
//! ```text
//! worker ── JobSink ──> Output  (Emission)
//!                  └──> Error   (ErrorRecord)
//! worker ────────────> Verbose (String)
//!                  └──> Warning (String)
//!                           |
//!          caller: try_pop / drain / recv (any thread)
//! ```
//!
//! Closing a queue drops its sender: pushes are refused afterwards, but items
//! already queued stay drainable.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::stream::{Emission, ErrorRecord, Sink};

/// Unbounded multi-producer queue that can be closed from either side.
#[derive(Debug)]
pub struct Queue<T> {
    tx: Mutex<Option<flume::Sender<T>>>,
    rx: flume::Receiver<T>,
}

impl<T> Queue<T> {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Appends an item. Never blocks. Returns false if the queue is closed.
    pub fn push(&self, item: T) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.send(item).is_ok())
    }

    /// Refuses further pushes. Pending items are kept.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Takes the oldest item, if any.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Takes everything queued right now.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Waits for the next item. Returns `None` once the queue is closed and empty.
    pub async fn recv(&self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Output, Error, Verbose and Warning queues of one job.
#[derive(Debug, Default)]
pub struct JobQueues {
    pub output: Queue<Emission>,
    pub error: Queue<ErrorRecord>,
    pub verbose: Queue<String>,
    pub warning: Queue<String>,
}

impl JobQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any queue still holds an item.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        !(self.output.is_empty()
            && self.error.is_empty()
            && self.verbose.is_empty()
            && self.warning.is_empty())
    }

    pub fn close_all(&self) {
        self.output.close();
        self.error.close();
        self.verbose.close();
        self.warning.close();
    }
}

/// Sink appending to a job's Output and Error queues.
///
/// Once the job's token is cancelled every emission is dropped.
#[derive(Debug, Clone)]
pub struct JobSink {
    queues: Arc<JobQueues>,
    token: CancellationToken,
}

impl JobSink {
    #[must_use]
    pub const fn new(queues: Arc<JobQueues>, token: CancellationToken) -> Self {
        Self { queues, token }
    }
}

fn closed(channel: &'static str) -> StreamError {
    StreamError::Sink {
        channel,
        source: io::Error::new(io::ErrorKind::BrokenPipe, "job queue is closed"),
    }
}

impl Sink for JobSink {
    fn emit_output(&mut self, value: Emission) -> Result<(), StreamError> {
        if self.token.is_cancelled() || self.queues.output.push(value) {
            Ok(())
        } else {
            Err(closed("output"))
        }
    }

    fn emit_error(&mut self, record: ErrorRecord) -> Result<(), StreamError> {
        if self.token.is_cancelled() || self.queues.error.push(record) {
            Ok(())
        } else {
            Err(closed("error"))
        }
    }
}
