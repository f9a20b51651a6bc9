//! End-to-end tests: window source → monitor → buffer → sink.

use std::sync::Arc;
use std::time::Duration;
use workflow_sensor_agent::collector::{ScriptStep, ScriptedSource, WindowObservation};
use workflow_sensor_agent::config::{BufferConfig, DetectorConfig};
use workflow_sensor_agent::delivery::{DeliveryBuffer, JsonlSink, MemorySink, TelemetryEvent};
use workflow_sensor_agent::monitor::{
    ElementSnapshot, FocusMonitor, InputContext, KeyPress, PageEvent, PromptDetector,
};
use workflow_sensor_agent::signatures::AppIdentifier;
use workflow_sensor_agent::transparency::{create_shared_log, AuditedSink};

const POLL: Duration = Duration::from_millis(1000);

fn buffer_config(batch_size: usize) -> BufferConfig {
    BufferConfig {
        batch_size,
        max_batch_wait: Duration::from_millis(2000),
        max_retries: 3,
        retry_base_delay: Duration::from_millis(100),
        max_queue_size: 100,
    }
}

fn app_ids(events: &[TelemetryEvent]) -> Vec<&str> {
    events.iter().map(|e| e.app_id()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_editor_then_chatgpt_yields_two_sends() {
    let sink = Arc::new(MemorySink::new());
    let buffer = DeliveryBuffer::new(buffer_config(1), sink.clone()).unwrap();
    buffer.set_session("S-E2E");

    let source = Arc::new(ScriptedSource::from_observations([
        WindowObservation::new("Visual Studio Code", "Code"),
        WindowObservation::new("ChatGPT", "Chrome").with_url("chat.openai.com"),
    ]));
    let monitor = FocusMonitor::new(source, Arc::new(AppIdentifier::builtin()), buffer.clone());

    monitor.start("S-E2E", POLL);
    tokio::time::sleep(Duration::from_millis(4500)).await;
    monitor.stop();

    assert_eq!(sink.attempts(), 2);
    let events = sink.events();
    assert_eq!(app_ids(&events), vec!["vscode", "chatgpt"]);
    assert!(events.iter().all(|e| e.session_id() == "S-E2E"));
    assert_eq!(buffer.stats().pending, 0);
}

#[tokio::test(start_paused = true)]
async fn test_outage_is_bridged_by_retries() {
    let sink = Arc::new(MemorySink::new());
    sink.fail_next(2);
    let buffer = DeliveryBuffer::new(buffer_config(1), sink.clone()).unwrap();
    buffer.set_session("S1");

    let source = Arc::new(ScriptedSource::new([
        ScriptStep::Observe(WindowObservation::new("Claude", "Claude")),
        ScriptStep::Observe(WindowObservation::new("main.rs - Cursor", "Cursor")),
    ]));
    let monitor = FocusMonitor::new(source, Arc::new(AppIdentifier::builtin()), buffer.clone());
    monitor.start("S1", POLL);

    // Retries at +200ms (retry_count 1) and +400ms (retry_count 2).
    tokio::time::sleep(Duration::from_millis(3000)).await;
    monitor.stop();
    buffer.flush().await;

    assert_eq!(app_ids(&sink.events()), vec!["claude", "cursor"]);
    let stats = buffer.stats();
    assert_eq!(stats.dropped_after_retries, 0);
    assert_eq!(stats.failed_attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_offline_session_delivers_after_reconnect() {
    let sink = Arc::new(MemorySink::new());
    let buffer = DeliveryBuffer::new(buffer_config(2), sink.clone()).unwrap();
    buffer.set_session("S1");
    buffer.set_online(false);

    let source = Arc::new(ScriptedSource::from_observations([
        WindowObservation::new("Xcode", "Xcode"),
        WindowObservation::new("Stack Overflow", "Safari").with_url("https://stackoverflow.com/q/1"),
        WindowObservation::new("Claude", "Claude"),
    ]));
    let monitor = FocusMonitor::new(source, Arc::new(AppIdentifier::builtin()), buffer.clone());
    monitor.start("S1", POLL);
    tokio::time::sleep(Duration::from_millis(5500)).await;

    assert_eq!(sink.attempts(), 0);
    assert_eq!(buffer.stats().pending, 3);

    buffer.set_online(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(app_ids(&sink.batches()[0]), vec!["xcode", "stackoverflow"]);

    // The trailing partial batch goes out once the batch wait elapses.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(
        app_ids(&sink.events()),
        vec!["xcode", "stackoverflow", "claude"]
    );
    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_monitor_and_detector_share_one_buffer() {
    let sink = Arc::new(MemorySink::new());
    let buffer = DeliveryBuffer::new(buffer_config(10), sink.clone()).unwrap();
    buffer.set_session("S1");
    let log = create_shared_log();

    let source = Arc::new(ScriptedSource::from_observations([
        WindowObservation::new("Claude", "Google Chrome").with_url("https://claude.ai/new"),
    ]));
    let monitor = FocusMonitor::new(source, Arc::new(AppIdentifier::builtin()), buffer.clone())
        .with_transparency(log.clone());
    let detector = PromptDetector::new(DetectorConfig::default(), buffer.clone())
        .with_transparency(log.clone());
    let input = InputContext::default();

    monitor.start("S1", POLL);
    detector.start("S1", &input);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let editor = ElementSnapshot::new(12, "div")
        .with_class("ProseMirror")
        .editable()
        .with_text("why does my borrow outlive the loop");
    input.dispatch(PageEvent::input("claude.ai", editor.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(detector.word_count(), 7);

    input.dispatch(PageEvent::key_down("claude.ai", editor, KeyPress::ctrl_enter()));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(detector.word_count(), 0);

    monitor.stop();
    detector.stop();
    buffer.flush().await;

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], TelemetryEvent::AppFocus(_)));
    match &events[1] {
        TelemetryEvent::PromptSubmit(e) => {
            assert_eq!(e.app_id, "claude");
            assert_eq!(e.prompt, None);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let stats = log.stats();
    assert_eq!(stats.focus_events, 1);
    assert_eq!(stats.prompt_submissions, 1);
}

#[tokio::test]
async fn test_jsonl_output_is_audited() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    let log = create_shared_log();
    let sink = Arc::new(AuditedSink::new(JsonlSink::new(&path), log.clone()));
    let buffer = DeliveryBuffer::new(buffer_config(2), sink).unwrap();
    buffer.set_session("S1");

    buffer.add_events([
        TelemetryEvent::app_focus("S1", "vscode"),
        TelemetryEvent::app_focus("S1", "chatgpt"),
        TelemetryEvent::prompt_submit("S1", "chatgpt", None),
    ]);
    buffer.flush().await;

    let lines = std::fs::read_to_string(&path).unwrap();
    assert_eq!(lines.lines().count(), 2);

    let stats = log.stats();
    assert_eq!(stats.batches_delivered, 2);
    assert_eq!(stats.events_delivered, 3);
}
