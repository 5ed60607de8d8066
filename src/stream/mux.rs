// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! The multiplexer: fan-in of stdout and stderr into one sink.
//!
//! ```text
//! LineSource(stdout) --reader task--\
//!                                    >-- flume::bounded --> loop --> Sink
//! LineSource(stderr) --reader task--/        (race)          |
//!                                                          policy
//!                                                   emit now | buffer
//!
//! loop until both sources sent End:
//!   Line  --> package, emit or append, reissue (reader does it)
//!             flush buffers at capacity
//!   End   --> retire source, flush its buffer unless merged
//!   Fault --> flush what is buffered, StreamError::Read
//! then flush non-empty buffers: output, error
//! ```
//!
//! Order within one stream is preserved; order across streams is whatever
//! the channel observed first.

use std::io;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, trace};

use super::policy::{BufferRef, RedirectionPolicy, Target};
use super::sink::Sink;
use super::source::{LineSource, StreamKind};
use super::value::{Emission, ErrorRecord};
use crate::error::StreamError;

/// Default capacity of the fan-in channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Counters for one multiplexer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxStats {
    /// Lines read from stdout.
    pub output_lines: usize,
    /// Lines read from stderr.
    pub error_lines: usize,
    /// Batches flushed from buffers.
    pub flushes: usize,
}

impl MuxStats {
    const fn record_line(&mut self, kind: StreamKind) {
        match kind {
            StreamKind::Output => self.output_lines += 1,
            StreamKind::Error => self.error_lines += 1,
        }
    }
}

enum StreamEvent {
    Line(StreamKind, String),
    End(StreamKind),
    Fault(StreamKind, io::Error),
}

/// Ordered batch of packaged lines for one logical target.
struct Buffer {
    target: BufferRef,
    items: Vec<Emission>,
    capacity: usize,
}

impl Buffer {
    fn new(target: BufferRef, capacity: usize) -> Self {
        Self {
            target,
            items: Vec::new(),
            capacity,
        }
    }

    fn push(&mut self, value: Emission) {
        self.items.push(value);
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Emits the contents as one batch and clears. Empty buffers emit nothing.
    fn flush<S: Sink + ?Sized>(&mut self, sink: &mut S, stats: &mut MuxStats) -> Result<(), StreamError> {
        if self.items.is_empty() {
            return Ok(());
        }
        let items = std::mem::take(&mut self.items);
        debug!(buffer = ?self.target, lines = items.len(), "flush");
        stats.flushes += 1;
        match self.target {
            BufferRef::Output => sink.emit_output(Emission::Batch(items)),
            BufferRef::Error => sink.emit_error(ErrorRecord::batch(items)),
        }
    }
}

/// Streams the two output pipes of one child into a [`Sink`].
#[derive(Debug)]
pub struct Multiplexer {
    stdout: LineSource,
    stderr: LineSource,
    policy: RedirectionPolicy,
    channel_capacity: usize,
}

impl Multiplexer {
    /// Creates a multiplexer over a stdout and a stderr source.
    #[must_use]
    pub const fn new(stdout: LineSource, stderr: LineSource, policy: RedirectionPolicy) -> Self {
        Self {
            stdout,
            stderr,
            policy,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets how many lines the readers may run ahead of the loop.
    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> &RedirectionPolicy {
        &self.policy
    }

    /// Runs until both sources reach end-of-stream.
    ///
    /// Termination depends only on the pipes closing, not on the process
    /// exiting. Dropping the returned future aborts both reader tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Read`] if a pipe read fails and
    /// [`StreamError::Sink`] if the sink refuses an emission.
    pub async fn run<S: Sink + ?Sized>(self, sink: &mut S) -> Result<MuxStats, StreamError> {
        let Self {
            stdout,
            stderr,
            policy,
            channel_capacity,
        } = self;

        let (tx, rx) = flume::bounded(channel_capacity.max(1));
        let _readers = [
            AbortOnDropHandle::new(tokio::spawn(pump(stdout, tx.clone()))),
            AbortOnDropHandle::new(tokio::spawn(pump(stderr, tx))),
        ];

        let mut active = [true; 2];
        let mut buffers = [
            Buffer::new(BufferRef::Output, policy.capacity()),
            Buffer::new(BufferRef::Error, policy.capacity()),
        ];
        let mut stats = MuxStats::default();

        while active.iter().any(|a| *a) {
            let Ok(event) = rx.recv_async().await else {
                let stream = if active[0] {
                    StreamKind::Output
                } else {
                    StreamKind::Error
                };
                return Err(StreamError::Read {
                    stream,
                    source: io::Error::other("reader task ended before end-of-stream"),
                });
            };

            match event {
                StreamEvent::End(kind) => {
                    debug!(stream = %kind, "end of stream");
                    active[kind.index()] = false;
                    if !policy.is_merged()
                        && let Target::AppendToBuffer(buffer) = policy.route(kind).target
                    {
                        buffers[buffer.index()].flush(sink, &mut stats)?;
                    }
                }
                StreamEvent::Fault(kind, source) => {
                    for buffer in &mut buffers {
                        if let Err(e) = buffer.flush(sink, &mut stats) {
                            debug!(stream = %kind, error = %e, "flush after read fault failed");
                        }
                    }
                    return Err(StreamError::Read {
                        stream: kind,
                        source,
                    });
                }
                StreamEvent::Line(kind, line) => {
                    trace!(stream = %kind, line = %line, "line");
                    stats.record_line(kind);

                    let route = policy.route(kind);
                    let value = route.wrap.package(line);
                    match route.target {
                        Target::EmitOutput => sink.emit_output(value)?,
                        Target::EmitError => sink.emit_error(value.into_error_record())?,
                        Target::AppendToBuffer(buffer) => buffers[buffer.index()].push(value),
                    }

                    for buffer in &mut buffers {
                        if buffer.is_full() {
                            buffer.flush(sink, &mut stats)?;
                        }
                    }
                }
            }
        }

        for buffer in &mut buffers {
            buffer.flush(sink, &mut stats)?;
        }

        debug!(
            output_lines = stats.output_lines,
            error_lines = stats.error_lines,
            flushes = stats.flushes,
            "streams drained"
        );
        Ok(stats)
    }
}

/// Reads one source to its end, one line in flight at a time.
async fn pump(mut source: LineSource, tx: flume::Sender<StreamEvent>) {
    let kind = source.kind();
    loop {
        let event = match source.next_line().await {
            Ok(Some(line)) => StreamEvent::Line(kind, line),
            Ok(None) => StreamEvent::End(kind),
            Err(e) => StreamEvent::Fault(kind, e),
        };
        let last = !matches!(event, StreamEvent::Line(..));
        if tx.send_async(event).await.is_err() || last {
            break;
        }
    }
}
