// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::run::stream_job;
use crate::job::test_utils::{Ending, FakeProcess};
use crate::job::{Job, JobState};
use crate::stream::{DirectSink, OutputFormat, RedirectOptions, RedirectionPolicy};

const LIMIT: Duration = Duration::from_secs(10);

fn background(buffer_size: usize) -> RedirectionPolicy {
    RedirectionPolicy::compute(
        &RedirectOptions::builder()
            .with_buffer_size(buffer_size)
            .build(),
    )
}

#[tokio::test]
async fn test_stream_job_forwards_all_queues() {
    let process = FakeProcess::new(&["one", "two"], &["bad"], Ending::Exit(0));
    let mut job = Job::new(process, background(1));
    job.start().unwrap();

    let mut sink = DirectSink::new(Vec::new(), Vec::new(), OutputFormat::Text);
    let state = tokio::time::timeout(LIMIT, stream_job(&job, &mut sink, &CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state, JobState::Completed);
    let (out, err) = sink.into_inner();
    assert_eq!(String::from_utf8(out).unwrap(), "one\ntwo\n");
    assert_eq!(String::from_utf8(err).unwrap(), "bad\n");
    assert!(!job.has_more_data());
}

#[tokio::test]
async fn test_stream_job_cancel_stops_job() {
    let process = FakeProcess::new(&["tick"], &[], Ending::UntilKilled);
    let killed = process.kill_signal();
    let mut job = Job::new(process, background(1));
    job.start().unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let mut sink = DirectSink::new(Vec::new(), Vec::new(), OutputFormat::Text);
    let state = tokio::time::timeout(LIMIT, stream_job(&job, &mut sink, &token))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state, JobState::Stopped);
    assert!(killed.is_cancelled());
}

#[tokio::test]
async fn test_stream_job_json_batches() {
    let process = FakeProcess::new(&["a", "b", "c"], &[], Ending::Exit(0));
    let mut job = Job::new(process, background(2));
    job.start().unwrap();

    let mut sink = DirectSink::new(Vec::new(), Vec::new(), OutputFormat::Json);
    tokio::time::timeout(LIMIT, stream_job(&job, &mut sink, &CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();

    let (out, _) = sink.into_inner();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(out.lines().count(), 2, "{out}");
}
