// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory stand-in for a child process.
//!
//! A script task writes the given lines into two duplex pipes, then either
//! closes them (exit) or keeps them open until killed.

use futures_util::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::process::ProcessControl;
use crate::error::ProcessError;
use crate::stream::{LineSource, StreamKind};

/// How the fake behaves after writing its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ending {
    /// Close both pipes and exit with this code.
    Exit(i32),
    /// Keep the pipes open until killed.
    UntilKilled,
    /// Close both pipes, then keep running until killed.
    ClosedUntilKilled,
    /// Keep the pipes open forever, like a grandchild surviving the kill.
    Never,
    /// Panic when the worker asks for the sources.
    PanicOnTake,
}

pub(crate) struct FakeProcess {
    sources: Option<(LineSource, LineSource)>,
    killed: CancellationToken,
    script: Option<JoinHandle<()>>,
    ending: Ending,
    exit_code: Option<i32>,
}

fn text(lines: &[&str]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

impl FakeProcess {
    pub(crate) fn new(stdout: &[&str], stderr: &[&str], ending: Ending) -> Self {
        let (mut out_w, out_r) = tokio::io::duplex(4096);
        let (mut err_w, err_r) = tokio::io::duplex(4096);
        let killed = CancellationToken::new();
        let (out, err) = (text(stdout), text(stderr));

        let script = tokio::spawn({
            let killed = killed.clone();
            async move {
                let _ = out_w.write_all(out.as_bytes()).await;
                let _ = err_w.write_all(err.as_bytes()).await;
                match ending {
                    Ending::Exit(_) | Ending::PanicOnTake => {}
                    Ending::UntilKilled => killed.cancelled().await,
                    Ending::ClosedUntilKilled => {
                        drop((out_w, err_w));
                        killed.cancelled().await;
                    }
                    Ending::Never => std::future::pending().await,
                }
            }
        });

        Self {
            sources: Some((
                LineSource::new(StreamKind::Output, out_r),
                LineSource::new(StreamKind::Error, err_r),
            )),
            killed,
            script: Some(script),
            ending,
            exit_code: None,
        }
    }

    /// A fake over caller-provided sources that exits with 0.
    pub(crate) fn from_sources(stdout: LineSource, stderr: LineSource) -> Self {
        Self {
            sources: Some((stdout, stderr)),
            killed: CancellationToken::new(),
            script: None,
            ending: Ending::Exit(0),
            exit_code: None,
        }
    }

    /// Token cancelled once the fake has been killed.
    pub(crate) fn kill_signal(&self) -> CancellationToken {
        self.killed.clone()
    }

    fn natural_code(&self) -> i32 {
        match self.ending {
            Ending::Exit(code) => code,
            _ => 0,
        }
    }
}

impl ProcessControl for FakeProcess {
    fn name(&self) -> &str {
        "fake"
    }

    fn take_sources(&mut self) -> Result<(LineSource, LineSource), ProcessError> {
        assert!(self.ending != Ending::PanicOnTake, "fake process refused its sources");
        self.sources.take().ok_or_else(|| ProcessError::StreamsTaken {
            name: "fake".to_string(),
        })
    }

    fn has_exited(&mut self) -> bool {
        self.exit_code.is_some()
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<(), ProcessError>> {
        Box::pin(async move {
            if self.exit_code.is_none() {
                self.killed.cancel();
                self.exit_code = Some(-1);
            }
            Ok(())
        })
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<i32, ProcessError>> {
        Box::pin(async move {
            if let Some(code) = self.exit_code {
                return Ok(code);
            }
            if let Some(script) = self.script.take() {
                let _ = script.await;
            }
            let code = self.natural_code();
            self.exit_code = Some(code);
            Ok(code)
        })
    }
}
