// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};

use super::{
    BufferRef, DirectSink, Emission, ErrorCategory, ErrorRecord, LineSource, Multiplexer,
    OutputFormat, RedirectOptions, RedirectionPolicy, Sink, StreamKind, Target, WrapKind,
};
use crate::error::StreamError;
use crate::utility::encoding::Encoding;

#[derive(Debug, PartialEq)]
enum Event {
    Output(Emission),
    Error(ErrorRecord),
}

#[derive(Default)]
struct RecordingSink {
    events: Vec<Event>,
}

impl RecordingSink {
    fn outputs(&self) -> Vec<&Emission> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Output(v) => Some(v),
                Event::Error(_) => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<&ErrorRecord> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Error(r) => Some(r),
                Event::Output(_) => None,
            })
            .collect()
    }
}

impl Sink for RecordingSink {
    fn emit_output(&mut self, value: Emission) -> Result<(), StreamError> {
        self.events.push(Event::Output(value));
        Ok(())
    }

    fn emit_error(&mut self, record: ErrorRecord) -> Result<(), StreamError> {
        self.events.push(Event::Error(record));
        Ok(())
    }
}

struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke")))
    }
}

/// Yields its data once, then fails every read.
struct FaultAfter(Option<Vec<u8>>);

impl AsyncRead for FaultAfter {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().0.take() {
            Some(data) => {
                buf.put_slice(&data);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke"))),
        }
    }
}

/// A pipe that stays open and silent.
struct SilentReader;

impl AsyncRead for SilentReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

/// Forwards every emission as soon as it happens.
struct ChannelSink(flume::Sender<Event>);

impl Sink for ChannelSink {
    fn emit_output(&mut self, value: Emission) -> Result<(), StreamError> {
        let _ = self.0.send(Event::Output(value));
        Ok(())
    }

    fn emit_error(&mut self, record: ErrorRecord) -> Result<(), StreamError> {
        let _ = self.0.send(Event::Error(record));
        Ok(())
    }
}

/// Runs stdout `text` against a stderr that never ends and returns what the
/// sink saw within `wait`.
async fn events_while_stderr_open(
    text: &str,
    options: &RedirectOptions,
    wait: Duration,
) -> Vec<Event> {
    let mux = Multiplexer::new(
        source(StreamKind::Output, text),
        LineSource::new(StreamKind::Error, SilentReader),
        RedirectionPolicy::compute(options),
    );
    let (tx, rx) = flume::unbounded();
    let mut sink = ChannelSink(tx);

    tokio::select! {
        result = mux.run(&mut sink) => panic!("stderr never ends, got {result:?}"),
        () = tokio::time::sleep(wait) => {}
    }
    rx.drain().collect()
}

fn source(kind: StreamKind, text: &str) -> LineSource {
    LineSource::new(kind, Cursor::new(text.as_bytes().to_vec()))
}

fn lines(n: usize) -> String {
    (1..=n).map(|i| format!("line{i}\n")).collect()
}

fn options(buffer_size: usize, merge: bool, wrap: bool) -> RedirectOptions {
    RedirectOptions::builder()
        .with_buffer_size(buffer_size)
        .with_merge(merge)
        .with_wrap(wrap)
        .build()
}

async fn run(stdout: &str, stderr: &str, options: &RedirectOptions) -> RecordingSink {
    let mux = Multiplexer::new(
        source(StreamKind::Output, stdout),
        source(StreamKind::Error, stderr),
        RedirectionPolicy::compute(options),
    );
    let mut sink = RecordingSink::default();
    mux.run(&mut sink).await.expect("multiplexer should drain");
    sink
}

// =============================================================================
// Policy table
// =============================================================================

#[test]
fn test_policy_table() {
    let cases = [
        (256, false, false),
        (1, false, false),
        (256, true, false),
        (1, true, false),
        (256, false, true),
        (1, false, true),
        (256, true, true),
        (1, true, true),
    ];
    let table: Vec<String> = cases
        .into_iter()
        .map(|(size, merge, wrap)| {
            let policy = RedirectionPolicy::compute(&options(size, merge, wrap));
            let out = policy.route(StreamKind::Output);
            let err = policy.route(StreamKind::Error);
            format!(
                "size={size} merge={merge} wrap={wrap}: {:?}/{:?} | {:?}/{:?}",
                out.wrap, out.target, err.wrap, err.target
            )
        })
        .collect();

    insta::assert_snapshot!(table.join("\n"), @r"
    size=256 merge=false wrap=false: Raw/AppendToBuffer(Output) | Raw/AppendToBuffer(Error)
    size=1 merge=false wrap=false: Raw/EmitOutput | ErrorRecord/EmitError
    size=256 merge=true wrap=false: Raw/AppendToBuffer(Output) | Raw/AppendToBuffer(Output)
    size=1 merge=true wrap=false: Raw/EmitOutput | ErrorRecord/EmitOutput
    size=256 merge=false wrap=true: TaggedOutput/AppendToBuffer(Output) | TaggedError/AppendToBuffer(Error)
    size=1 merge=false wrap=true: TaggedOutput/EmitOutput | TaggedErrorRecordForError/EmitError
    size=256 merge=true wrap=true: TaggedOutput/AppendToBuffer(Output) | TaggedError/AppendToBuffer(Output)
    size=1 merge=true wrap=true: TaggedOutput/EmitOutput | TaggedErrorRecordForOutput/EmitOutput
    ");
}

#[test]
fn test_policy_buffer_size_decides_batching() {
    for size in [0, 1, 2, 256] {
        let policy = RedirectionPolicy::compute(&options(size, false, false));
        for kind in StreamKind::ALL {
            let batched = matches!(policy.route(kind).target, Target::AppendToBuffer(_));
            assert_eq!(batched, size > 1, "size {size}, stream {kind}");
        }
        assert_eq!(policy.capacity(), size.max(1));
    }
}

#[test]
fn test_policy_merge_aliases_error_buffer() {
    let policy = RedirectionPolicy::compute(&options(8, true, true));
    assert!(policy.is_merged());
    assert_eq!(
        policy.route(StreamKind::Error).target,
        Target::AppendToBuffer(BufferRef::Output)
    );
    assert_eq!(policy.route(StreamKind::Error).wrap, WrapKind::TaggedError);
}

#[test]
fn test_wrap_kind_package_tags_origin() {
    let origins: Vec<_> = [
        WrapKind::Raw,
        WrapKind::TaggedOutput,
        WrapKind::TaggedError,
        WrapKind::ErrorRecord,
        WrapKind::TaggedErrorRecordForOutput,
        WrapKind::TaggedErrorRecordForError,
    ]
    .into_iter()
    .map(|kind| kind.package("x".to_string()).origin())
    .collect();

    assert_eq!(
        origins,
        [
            None,
            Some(StreamKind::Output),
            Some(StreamKind::Error),
            Some(StreamKind::Error),
            Some(StreamKind::Error),
            Some(StreamKind::Error),
        ]
    );
}

// =============================================================================
// Multiplexer
// =============================================================================

#[tokio::test]
async fn test_unbuffered_output_lines_in_order() {
    let sink = run(&lines(5), "", &options(1, false, false)).await;

    let expected: Vec<Emission> = (1..=5).map(|i| Emission::Line(format!("line{i}"))).collect();
    assert_eq!(sink.outputs(), expected.iter().collect::<Vec<_>>());
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn test_buffered_output_batches() {
    let sink = run(&lines(10), "", &options(4, false, false)).await;

    let sizes: Vec<usize> = sink.outputs().iter().map(|v| v.line_count()).collect();
    assert_eq!(sizes, [4, 4, 2]);

    let all: Vec<String> = sink
        .outputs()
        .iter()
        .flat_map(|v| match v {
            Emission::Batch(items) => items.iter().map(Emission::text).collect::<Vec<_>>(),
            other => vec![other.text()],
        })
        .collect();
    let expected: Vec<String> = (1..=10).map(|i| format!("line{i}")).collect();
    assert_eq!(all, expected);
}

#[tokio::test]
async fn test_exact_multiple_has_no_trailing_batch() {
    let sink = run(&lines(6), "", &options(3, false, false)).await;
    assert_eq!(sink.outputs().len(), 2);
}

#[tokio::test]
async fn test_three_lines_default_buffer_single_flush() {
    let sink = run("A\nB\nC\n", "", &RedirectOptions::default()).await;

    assert_eq!(
        sink.events,
        [Event::Output(Emission::Batch(vec![
            Emission::Line("A".into()),
            Emission::Line("B".into()),
            Emission::Line("C".into()),
        ]))]
    );
}

#[tokio::test]
async fn test_empty_streams_produce_nothing() {
    let mux = Multiplexer::new(
        source(StreamKind::Output, ""),
        source(StreamKind::Error, ""),
        RedirectionPolicy::default(),
    );
    let mut sink = RecordingSink::default();
    let stats = mux.run(&mut sink).await.unwrap();

    assert!(sink.events.is_empty());
    assert_eq!(stats.flushes, 0);
    assert_eq!(stats.output_lines + stats.error_lines, 0);
}

#[tokio::test]
async fn test_merge_unwrapped_unbuffered() {
    let sink = run("out\n", "err\n", &options(1, true, false)).await;

    assert!(sink.errors().is_empty());
    let mut outputs = sink.outputs();
    outputs.sort_by_key(|v| matches!(v, Emission::Error(_)));
    assert_eq!(
        outputs,
        [
            &Emission::Line("out".into()),
            &Emission::Error(ErrorRecord::stderr("err")),
        ]
    );
}

#[tokio::test]
async fn test_wrap_unbuffered_discriminates_streams() {
    let sink = run("o1\no2\n", "e1\n", &options(1, false, true)).await;

    let outputs = sink.outputs();
    assert_eq!(outputs.len(), 2);
    assert!(outputs.iter().all(|v| v.origin() == Some(StreamKind::Output)));

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message(), "e1");
    assert_eq!(
        errors[0].target().and_then(Emission::origin),
        Some(StreamKind::Error)
    );
}

#[tokio::test]
async fn test_merge_wrapped_buffered_keeps_origin() {
    let sink = run("o1\no2\n", "e1\ne2\n", &options(256, true, true)).await;

    assert!(sink.errors().is_empty());
    let outputs = sink.outputs();
    assert_eq!(outputs.len(), 1);
    let Emission::Batch(items) = outputs[0] else {
        panic!("expected a batch, got {:?}", outputs[0]);
    };

    let origin_of = |text: &str| {
        items
            .iter()
            .find(|v| v.text() == text)
            .and_then(Emission::origin)
    };
    assert_eq!(origin_of("o1"), Some(StreamKind::Output));
    assert_eq!(origin_of("o2"), Some(StreamKind::Output));
    assert_eq!(origin_of("e1"), Some(StreamKind::Error));
    assert_eq!(origin_of("e2"), Some(StreamKind::Error));
}

#[tokio::test]
async fn test_merge_preserves_per_stream_order() {
    let sink = run(&lines(50), &lines(50), &options(1, true, true)).await;

    let stderr: Vec<String> = sink
        .outputs()
        .iter()
        .filter(|v| v.origin() == Some(StreamKind::Error))
        .map(|v| v.text())
        .collect();
    let stdout: Vec<String> = sink
        .outputs()
        .iter()
        .filter(|v| v.origin() == Some(StreamKind::Output))
        .map(|v| v.text())
        .collect();

    let expected: Vec<String> = (1..=50).map(|i| format!("line{i}")).collect();
    assert_eq!(stdout, expected);
    assert_eq!(stderr, expected);
}

#[tokio::test]
async fn test_buffered_stderr_flushes_one_record() {
    let sink = run("", "first\nsecond\n", &options(16, false, false)).await;

    assert!(sink.outputs().is_empty());
    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category(), ErrorCategory::StdErr);
    assert_eq!(errors[0].message(), "first\nsecond");
    assert_eq!(errors[0].target().map(Emission::line_count), Some(2));
}

#[tokio::test]
async fn test_buffer_flushes_when_its_stream_ends() {
    let events = events_while_stderr_open(
        "o1\no2\n",
        &options(16, false, false),
        Duration::from_millis(200),
    )
    .await;

    assert_eq!(
        events,
        [Event::Output(Emission::Batch(vec![
            Emission::Line("o1".into()),
            Emission::Line("o2".into()),
        ]))]
    );
}

#[tokio::test]
async fn test_merged_buffer_waits_for_both_streams() {
    let events =
        events_while_stderr_open("o1\n", &options(16, true, false), Duration::from_millis(200))
            .await;

    assert!(events.is_empty(), "{events:?}");
}

#[tokio::test]
async fn test_both_buffers_flush_once() {
    let sink = run("o\n", "e\n", &options(16, false, false)).await;

    assert_eq!(sink.outputs().len(), 1);
    assert_eq!(sink.errors().len(), 1);
    assert_eq!(sink.events.len(), 2);
}

#[tokio::test]
async fn test_stats_count_lines() {
    let mux = Multiplexer::new(
        source(StreamKind::Output, &lines(7)),
        source(StreamKind::Error, &lines(3)),
        RedirectionPolicy::compute(&options(5, false, false)),
    )
    .with_channel_capacity(1);
    let mut sink = RecordingSink::default();
    let stats = mux.run(&mut sink).await.unwrap();

    assert_eq!(stats.output_lines, 7);
    assert_eq!(stats.error_lines, 3);
    // stdout: 5 + 2, stderr: 3
    assert_eq!(stats.flushes, 3);
}

#[tokio::test]
async fn test_read_fault_is_reported() {
    let mux = Multiplexer::new(
        source(StreamKind::Output, ""),
        LineSource::new(StreamKind::Error, FailingReader),
        RedirectionPolicy::default(),
    );
    let mut sink = RecordingSink::default();
    let err = mux.run(&mut sink).await.unwrap_err();

    assert!(
        matches!(err, StreamError::Read { stream: StreamKind::Error, .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_read_fault_flushes_buffered_lines() {
    let mux = Multiplexer::new(
        LineSource::new(StreamKind::Output, FaultAfter(Some(b"a\nb\n".to_vec()))),
        source(StreamKind::Error, ""),
        RedirectionPolicy::compute(&options(16, false, false)),
    );
    let mut sink = RecordingSink::default();
    let err = mux.run(&mut sink).await.unwrap_err();

    assert!(matches!(err, StreamError::Read { stream: StreamKind::Output, .. }));
    assert_eq!(
        sink.outputs(),
        [&Emission::Batch(vec![
            Emission::Line("a".into()),
            Emission::Line("b".into()),
        ])]
    );
}

#[tokio::test]
async fn test_sink_fault_aborts_run() {
    struct ClosedPipe;
    impl io::Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mux = Multiplexer::new(
        source(StreamKind::Output, "a\n"),
        source(StreamKind::Error, ""),
        RedirectionPolicy::compute(&options(1, false, false)),
    );
    let mut sink = DirectSink::new(ClosedPipe, Vec::new(), OutputFormat::Text);
    let err = mux.run(&mut sink).await.unwrap_err();

    assert!(matches!(err, StreamError::Sink { channel: "output", .. }));
}

// =============================================================================
// Line sources
// =============================================================================

#[tokio::test]
async fn test_line_source_terminators() {
    let mut src = source(StreamKind::Output, "a\r\n\nb\nlast");
    let mut seen = Vec::new();
    while let Some(line) = src.next_line().await.unwrap() {
        seen.push(line);
    }

    assert_eq!(seen, ["a", "", "b", "last"]);
    assert!(src.is_ended());
    assert_eq!(src.next_line().await.unwrap(), None);
}

#[tokio::test]
async fn test_line_source_decodes_code_page() {
    let bytes = b"caf\xe9\r\nna\xefve".to_vec();
    let mut src = LineSource::with_encoding(StreamKind::Error, Cursor::new(bytes), Encoding::Acp);

    assert_eq!(src.next_line().await.unwrap().as_deref(), Some("café"));
    assert_eq!(src.next_line().await.unwrap().as_deref(), Some("naïve"));
    assert_eq!(src.next_line().await.unwrap(), None);
}

// =============================================================================
// Direct sink rendering
// =============================================================================

#[test]
fn test_direct_sink_text() {
    let mut sink = DirectSink::new(Vec::new(), Vec::new(), OutputFormat::Text);
    sink.emit_output(WrapKind::Raw.package("plain".into())).unwrap();
    sink.emit_output(WrapKind::TaggedOutput.package("tagged".into()))
        .unwrap();
    sink.emit_output(WrapKind::TaggedErrorRecordForOutput.package("merged".into()))
        .unwrap();
    sink.emit_error(ErrorRecord::batch(vec![
        Emission::Line("e1".into()),
        Emission::Line("e2".into()),
    ]))
    .unwrap();

    let (out, err) = sink.into_inner();
    insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
    plain
    [stdout] tagged
    [stderr] merged
    ");
    insta::assert_snapshot!(String::from_utf8(err).unwrap(), @r"
    e1
    e2
    ");
}

#[test]
fn test_direct_sink_json() {
    let mut sink = DirectSink::new(Vec::new(), Vec::new(), OutputFormat::Json);
    sink.emit_output(Emission::Batch(vec![
        WrapKind::TaggedOutput.package("o".into()),
        WrapKind::TaggedError.package("e".into()),
    ]))
    .unwrap();
    sink.emit_error(ErrorRecord::stderr("boom")).unwrap();

    let (out, err) = sink.into_inner();
    insta::assert_snapshot!(
        String::from_utf8(out).unwrap().trim_end(),
        @r#"[{"stream":"stdout","line":"o"},{"stream":"stderr","line":"e"}]"#
    );
    insta::assert_snapshot!(
        String::from_utf8(err).unwrap().trim_end(),
        @r#"{"category":"std_err","message":"boom"}"#
    );
}
