// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Caller-owned registry of background jobs.
//!
//! ```text
//! create(process, policy, name) --> JobId (NotStarted)
//! insert(job)        --> JobId
//! list()             --> [JobInfo] ordered by id
//! get(id)            --> &Job | NotFound
//! find_by_name("b*") --> [&Job]  (exact name, else wax glob)
//! remove(id, force)  --> Running && !force: StillRunning
//!                        otherwise dispose (cancels a running job)
//! ```

use std::collections::BTreeMap;

use crate::error::{JobError, Result};
use anyhow::Context;
use wax::{Glob, Program};

use super::{Job, JobId, JobInfo, JobState};
use crate::core::process::ProcessControl;
use crate::stream::RedirectionPolicy;

/// Jobs created by one caller. Jobs do not know about the registry.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<JobId, Job>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a job for `process` and registers it; the job is not started.
    pub fn create(
        &mut self,
        process: impl ProcessControl + 'static,
        policy: RedirectionPolicy,
        name: Option<&str>,
    ) -> JobId {
        let job = Job::new(process, policy);
        self.insert(match name {
            Some(name) => job.with_name(name),
            None => job,
        })
    }

    /// Takes ownership of a job.
    pub fn insert(&mut self, job: Job) -> JobId {
        let id = job.id();
        tracing::debug!(job = %id, name = %job.name(), "registered");
        self.jobs.insert(id, job);
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Summaries of all jobs, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<JobInfo> {
        self.jobs.values().map(Job::info).collect()
    }

    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if no job has this id.
    pub fn get(&self, id: JobId) -> std::result::Result<&Job, JobError> {
        self.jobs.get(&id).ok_or(JobError::NotFound(id.get()))
    }

    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if no job has this id.
    pub fn get_mut(&mut self, id: JobId) -> std::result::Result<&mut Job, JobError> {
        self.jobs.get_mut(&id).ok_or(JobError::NotFound(id.get()))
    }

    /// Finds jobs by name; the pattern may be a glob.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid glob.
    pub fn find_by_name(&self, pattern: &str) -> Result<Vec<&Job>> {
        let exact: Vec<&Job> = self.jobs.values().filter(|j| j.name() == pattern).collect();
        if !exact.is_empty() {
            return Ok(exact);
        }

        let glob =
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?;
        Ok(self
            .jobs
            .values()
            .filter(|job| glob.is_match(job.name()))
            .collect())
    }

    /// Removes a job and disposes it.
    ///
    /// A running job is only removed when `force` is set; it is stopped in the
    /// process (its child is killed by the worker).
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for an unknown id and
    /// [`JobError::StillRunning`] for a running job without `force`.
    pub fn remove(&mut self, id: JobId, force: bool) -> std::result::Result<JobInfo, JobError> {
        let job = self.get(id)?;
        if job.state() == JobState::Running && !force {
            return Err(JobError::StillRunning {
                id: id.get(),
                name: job.name().to_string(),
            });
        }

        let mut job = self.jobs.remove(&id).ok_or(JobError::NotFound(id.get()))?;
        job.dispose();
        tracing::debug!(job = %id, name = %job.name(), force, "removed");
        Ok(job.info())
    }
}
