// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Line-oriented reader over one of the child's output pipes.
//!
//! ```text
//! LineSource (Output | Error)
//!   Utf8/Unknown --> read_until('\n'), lossy UTF-8
//!   Other        --> fill_buf() --> EncodedBuffer
//!   next_line()  --> Some(line) ... None (retired)
//! ```

use serde::Serialize;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::utility::encoding::{EncodedBuffer, Encoding};

/// Identity of an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StreamKind {
    #[serde(rename = "stdout")]
    Output,
    #[serde(rename = "stderr")]
    Error,
}

impl StreamKind {
    /// Both streams, output first.
    pub const ALL: [Self; 2] = [Self::Output, Self::Error];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Output => 0,
            Self::Error => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Output => "stdout",
            Self::Error => "stderr",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// One readable, line-oriented output stream of a child process.
///
/// The source owns its pipe exclusively. `next_line` takes `&mut self`, so at
/// most one read is in flight. Once it has returned `Ok(None)` the source is
/// retired and keeps returning `Ok(None)`.
pub struct LineSource {
    kind: StreamKind,
    reader: BufReader<BoxedReader>,
    /// Present for encodings that need byte-level decoding.
    decoder: Option<EncodedBuffer>,
    scratch: Vec<u8>,
    ended: bool,
}

impl LineSource {
    /// Creates a UTF-8 source.
    pub fn new<R>(kind: StreamKind, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_encoding(kind, reader, Encoding::Unknown)
    }

    /// Creates a source decoding the given encoding.
    pub fn with_encoding<R>(kind: StreamKind, reader: R, encoding: Encoding) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let boxed: BoxedReader = Box::new(reader);
        Self {
            kind,
            reader: BufReader::new(boxed),
            decoder: (!encoding.is_utf8()).then(|| EncodedBuffer::new(encoding)),
            scratch: Vec::new(),
            ended: false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Returns true once end-of-stream has been observed.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Reads the next line, without its terminator.
    ///
    /// Returns `Ok(None)` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the pipe read fails.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        if self.decoder.is_some() {
            return self.next_decoded_line().await;
        }
        if self.ended {
            return Ok(None);
        }

        self.scratch.clear();
        let read = self.reader.read_until(b'\n', &mut self.scratch).await?;
        if read == 0 {
            self.ended = true;
            return Ok(None);
        }

        let mut line = self.scratch.as_slice();
        if let Some(stripped) = line.strip_suffix(b"\n") {
            line = stripped;
        }
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }

    async fn next_decoded_line(&mut self) -> io::Result<Option<String>> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };

        loop {
            if let Some(line) = decoder.next_line(self.ended) {
                return Ok(Some(line));
            }
            if self.ended {
                return Ok(None);
            }

            let chunk = self.reader.fill_buf().await?;
            if chunk.is_empty() {
                self.ended = true;
                continue;
            }
            let len = chunk.len();
            decoder.add(chunk);
            self.reader.consume(len);
        }
    }
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("kind", &self.kind)
            .field("decoding", &self.decoder.is_some())
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}
