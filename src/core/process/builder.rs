// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Process builder with configuration options.
//!
//! ```text
//! ProcessBuilder
//!  • new/which/raw/exists/find
//!  • arg/args/cwd/env/stdin/name
//!  • stdout_encoding/stderr_encoding, inherit_stdio
//!  • spawn() --> ProcessHandle
//! ```

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{OnceLock, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::controller::ProcessHandle;
use crate::error::ProcessError;
use crate::stream::{LineSource, StreamKind};
use crate::utility::encoding::Encoding;

/// Static cache for executable paths resolved via `which`.
static EXECUTABLE_CACHE: OnceLock<RwLock<BTreeMap<String, PathBuf>>> = OnceLock::new();

fn exe_cache() -> &'static RwLock<BTreeMap<String, PathBuf>> {
    EXECUTABLE_CACHE.get_or_init(|| RwLock::new(BTreeMap::new()))
}

/// Builder for configuring and spawning a child process.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    /// Overrides on top of the inherited environment
    env: BTreeMap<String, String>,
    stdin: Option<String>,
    name: Option<String>,
    stdout_encoding: Encoding,
    stderr_encoding: Encoding,
    /// Pipe stdout/stderr for a multiplexer; otherwise inherit them.
    redirect: bool,
}

impl ProcessBuilder {
    /// Creates a new `ProcessBuilder` for the given program.
    ///
    /// A bare name is resolved via PATH by the OS when the process is spawned.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            stdin: None,
            name: None,
            stdout_encoding: Encoding::Unknown,
            stderr_encoding: Encoding::Unknown,
            redirect: true,
        }
    }

    /// Creates a `ProcessBuilder` after resolving the program via PATH.
    ///
    /// Results are cached for subsequent lookups of the same program.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::ExecutableNotFound`] if the program is not in PATH.
    pub fn which(program: &str) -> Result<Self, ProcessError> {
        Self::find(program)
            .map(Self::new)
            .ok_or_else(|| ProcessError::ExecutableNotFound {
                name: program.to_string(),
            })
    }

    /// Checks if an executable exists in PATH.
    #[must_use]
    pub fn exists(program: &str) -> bool {
        Self::find(program).is_some()
    }

    /// Finds the full path to an executable in PATH.
    #[must_use]
    pub fn find(program: &str) -> Option<PathBuf> {
        {
            let cache = exe_cache()
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(path) = cache.get(program) {
                return Some(path.clone());
            }
        }

        let path = which::which(program).ok()?;
        exe_cache()
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(program.to_string(), path.clone());
        Some(path)
    }

    /// Creates a `ProcessBuilder` running a command line through the shell.
    ///
    /// `pwsh -NoProfile -Command` on Windows, `/bin/sh -c` elsewhere.
    pub fn raw(command: impl Into<String>) -> Self {
        let cmd = command.into();
        #[cfg(windows)]
        {
            Self::new("pwsh").args(["-NoProfile", "-NonInteractive", "-Command", cmd.as_str()])
        }
        #[cfg(not(windows))]
        {
            Self::new("/bin/sh").args(["-c", cmd.as_str()])
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
        self
    }

    /// Sets the working directory for the process.
    #[must_use]
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Sets one environment variable; the rest is inherited.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Text written to the child's stdin, which is then closed.
    #[must_use]
    pub fn stdin(mut self, content: impl Into<String>) -> Self {
        self.stdin = Some(content.into());
        self
    }

    /// Sets a display name for logging.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn stdout_encoding(mut self, encoding: Encoding) -> Self {
        self.stdout_encoding = encoding;
        self
    }

    #[must_use]
    pub const fn stderr_encoding(mut self, encoding: Encoding) -> Self {
        self.stderr_encoding = encoding;
        self
    }

    /// Lets the child write straight to this process's stdout/stderr.
    #[must_use]
    pub const fn inherit_stdio(mut self) -> Self {
        self.redirect = false;
        self
    }

    #[must_use]
    pub const fn program(&self) -> &PathBuf {
        &self.program
    }

    #[must_use]
    pub const fn is_redirected(&self) -> bool {
        self.redirect
    }

    /// Returns the display name for this process.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.program.file_stem().map_or_else(
                || "process".to_string(),
                |s| s.to_string_lossy().into_owned(),
            )
        })
    }

    /// Returns the full command line as a string (for logging).
    #[must_use]
    pub fn command_line(&self) -> String {
        use std::fmt::Write as _;

        let mut cmd = format!("{}", self.program.display());
        for arg in &self.args {
            if arg.contains(' ') {
                let _ = write!(cmd, " \"{arg}\"");
            } else {
                let _ = write!(cmd, " {arg}");
            }
        }
        cmd
    }

    /// Spawns the process.
    ///
    /// Must be called inside a tokio runtime. The child is killed if the
    /// returned handle is dropped while it is still running.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::SpawnFailed`] if the OS refuses to start it.
    pub fn spawn(self) -> Result<ProcessHandle, ProcessError> {
        let name = self.display_name();
        let cmd_line = self.command_line();

        if let Some(cwd) = &self.cwd {
            debug!(cwd = %cwd.display(), "cd");
        }
        debug!(cmd = %cmd_line, redirect = self.redirect, "exec");

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed {
                command: cmd_line,
                source,
            })?;
        trace!(process = %name, pid = ?child.id(), "spawned");

        if let Some(content) = self.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            let process = name.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(content.as_bytes()).await {
                    warn!(process = %process, error = %e, "failed to write stdin");
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .map(|r| LineSource::with_encoding(StreamKind::Output, r, self.stdout_encoding));
        let stderr = child
            .stderr
            .take()
            .map(|r| LineSource::with_encoding(StreamKind::Error, r, self.stderr_encoding));

        Ok(ProcessHandle::new(name, child, stdout.zip(stderr)))
    }

    fn build_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command.envs(&self.env);

        command.stdin(match (&self.stdin, self.redirect) {
            (Some(_), _) => Stdio::piped(),
            (None, true) => Stdio::null(),
            (None, false) => Stdio::inherit(),
        });
        if self.redirect {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        command.kill_on_drop(true);
        command
    }
}
