// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use super::{ConfigError, JobError, PipemuxError, PipemuxResult, StreamError};
use crate::job::JobState;
use crate::stream::StreamKind;

#[test]
fn test_config_error_display() {
    let err = ConfigError::InvalidValue {
        section: "redirect".to_string(),
        key: "buffer_size".to_string(),
        message: "must be at least 1, got 0".to_string(),
    };
    insta::assert_snapshot!(
        err.to_string(),
        @"invalid value for 'buffer_size' in section '[redirect]': must be at least 1, got 0"
    );
}

#[test]
fn test_job_error_display() {
    let err = JobError::InvalidState {
        id: 7,
        operation: "stop",
        expected: JobState::Running,
        actual: JobState::Completed,
    };
    insta::assert_snapshot!(
        err.to_string(),
        @"cannot stop job 7: state is Completed, expected Running"
    );
}

#[test]
fn test_stream_error_wraps_io() {
    let err: PipemuxError = StreamError::Read {
        stream: StreamKind::Error,
        source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"),
    }
    .into();
    insta::assert_snapshot!(err.to_string(), @"stream error: failed to read stderr: pipe closed");
}

#[test]
fn test_pipemux_error_size() {
    // Box<str> variants (Other) are 16 bytes (fat pointer: ptr + len)
    // With discriminant + alignment = 24 bytes
    let size = std::mem::size_of::<PipemuxError>();
    assert!(size <= 24, "PipemuxError is {size} bytes, expected <= 24");
}

#[test]
fn test_pipemux_result_size() {
    let size = std::mem::size_of::<PipemuxResult<()>>();
    assert!(size <= 24, "PipemuxResult<()> is {size} bytes, expected <= 24");
}
