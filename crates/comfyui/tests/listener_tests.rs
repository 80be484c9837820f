//! Tests for waiting on the output node over an event stream.

mod common;

use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_matches::assert_matches;
use canvas_comfyui::listener::{await_output, ListenerError, OutputTarget};
use tokio_util::sync::CancellationToken;

use common::{execution_error, executed, progress, FakeEvents};

const PROMPT_ID: &str = "prompt-1";

fn target() -> OutputTarget<'static> {
    OutputTarget {
        prompt_id: PROMPT_ID,
        output_node: "9",
        output_dir: Path::new("output"),
    }
}

async fn run(events: &mut FakeEvents) -> Result<PathBuf, ListenerError> {
    await_output(
        events,
        &target(),
        Duration::from_secs(30),
        &CancellationToken::new(),
    )
    .await
}

// ---------------------------------------------------------------------------
// Test: only the output node completes the wait
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ignores_other_nodes_and_returns_after_output_node() {
    let mut events = FakeEvents::new(vec![
        executed("3", PROMPT_ID, &["three.png"]),
        executed("9", PROMPT_ID, &["nine.png"]),
        progress(1, 1),
    ]);

    let path = run(&mut events).await.unwrap();

    assert_eq!(path, Path::new("output/nine.png"));
    // The frame after the output node's event is never read.
    assert_eq!(events.remaining(), 1);
}

// ---------------------------------------------------------------------------
// Test: first image wins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn returns_first_image_only() {
    let mut events = FakeEvents::new(vec![executed("9", PROMPT_ID, &["a.png", "b.png"])]);

    let path = run(&mut events).await.unwrap();

    assert_eq!(path, Path::new("output/a.png"));
}

// ---------------------------------------------------------------------------
// Test: noise on the stream is skipped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skips_malformed_and_unknown_frames() {
    let mut events = FakeEvents::new(vec![
        "{not json".to_string(),
        r#"{"type":"crystools.monitor","data":{"cpu_utilization":3}}"#.to_string(),
        r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":1}}}}"#.to_string(),
        progress(10, 20),
        executed("9", PROMPT_ID, &["done.png"]),
    ]);

    assert_eq!(run(&mut events).await.unwrap(), Path::new("output/done.png"));
}

#[tokio::test]
async fn ignores_output_of_other_prompts() {
    let mut events = FakeEvents::new(vec![
        executed("9", "someone-else", &["theirs.png"]),
        executed("9", PROMPT_ID, &["ours.png"]),
    ]);

    assert_eq!(run(&mut events).await.unwrap(), Path::new("output/ours.png"));
}

// ---------------------------------------------------------------------------
// Test: failures are reported, not waited out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execution_error_fails_the_wait() {
    let mut events = FakeEvents::new(vec![
        execution_error("someone-else", "ignored"),
        execution_error(PROMPT_ID, "CUDA out of memory"),
    ]);

    let err = run(&mut events).await.unwrap_err();

    assert_matches!(err, ListenerError::ExecutionFailed { ref message, .. } if message == "CUDA out of memory");
    assert!(err.to_string().contains("CUDA out of memory"));
}

#[tokio::test]
async fn interrupted_prompt_fails_the_wait() {
    let frame = format!(r#"{{"type":"execution_interrupted","data":{{"prompt_id":"{PROMPT_ID}"}}}}"#);
    let mut events = FakeEvents::new(vec![frame]);

    assert_matches!(run(&mut events).await, Err(ListenerError::Interrupted { .. }));
}

#[tokio::test]
async fn output_node_without_images_is_an_error() {
    let mut events = FakeEvents::new(vec![executed("9", PROMPT_ID, &[])]);

    assert_matches!(run(&mut events).await, Err(ListenerError::NoOutput { node }) if node == "9");
}

#[tokio::test]
async fn null_output_on_output_node_is_an_error() {
    let frame = format!(
        r#"{{"type":"executed","data":{{"node":"9","output":null,"prompt_id":"{PROMPT_ID}"}}}}"#
    );
    let mut events = FakeEvents::new(vec![frame]).held_open();

    assert_matches!(run(&mut events).await, Err(ListenerError::NoOutput { node }) if node == "9");
}

#[tokio::test]
async fn closed_stream_is_reported() {
    let mut events = FakeEvents::new(vec![executed("3", PROMPT_ID, &["three.png"])]);

    assert_matches!(run(&mut events).await, Err(ListenerError::ConnectionClosed { .. }));
}

// ---------------------------------------------------------------------------
// Test: deadline and cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn silent_stream_times_out() {
    let mut events = FakeEvents::new(vec![progress(1, 20)]).held_open();
    let start = tokio::time::Instant::now();

    let result = await_output(
        &mut events,
        &target(),
        Duration::from_secs(600),
        &CancellationToken::new(),
    )
    .await;

    assert_matches!(result, Err(ListenerError::Timeout { timeout, .. }) if timeout == Duration::from_secs(600));
    assert_eq!(start.elapsed(), Duration::from_secs(600));
}

#[tokio::test]
async fn cancellation_stops_the_wait() {
    let mut events = FakeEvents::new(vec![]).held_open();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = await_output(&mut events, &target(), Duration::from_secs(600), &cancel).await;

    assert_matches!(result, Err(ListenerError::Cancelled { prompt_id }) if prompt_id == PROMPT_ID);
}
