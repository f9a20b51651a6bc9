//! Replays a short scripted session through the full pipeline.
//!
//! This example shows how to:
//! 1. Drive the focus monitor from a scripted window source
//! 2. Feed page events to the prompt detector
//! 3. Ride out a simulated outage with the delivery buffer's retries
//! 4. Read the transparency summary at the end
//!
//! Run with: cargo run --example replay_demo

use std::sync::Arc;
use std::time::Duration;

use workflow_sensor_agent::{
    collector::{ScriptStep, ScriptedSource, WindowObservation},
    config::{BufferConfig, DetectorConfig},
    delivery::{DeliveryBuffer, MemorySink},
    monitor::{ElementSnapshot, FocusMonitor, InputContext, KeyPress, PageEvent, PromptDetector},
    signatures::AppIdentifier,
    transparency::{create_shared_log, AuditedSink},
    PRIVACY_DECLARATION,
};

const SESSION: &str = "demo-session";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Workflow Sensor Agent - Replay Demo");
    println!("===================================");
    println!("{PRIVACY_DECLARATION}");

    let log = create_shared_log();
    let memory = Arc::new(MemorySink::new());
    // The first two deliveries fail so the retry path is visible.
    memory.fail_next(2);

    let buffer = DeliveryBuffer::new(
        BufferConfig {
            batch_size: 2,
            max_batch_wait: Duration::from_millis(500),
            retry_base_delay: Duration::from_millis(100),
            ..BufferConfig::default()
        },
        Arc::new(AuditedSink::new(memory.clone(), log.clone())),
    )?;
    buffer.set_session(SESSION);

    let source = Arc::new(ScriptedSource::new([
        ScriptStep::Observe(WindowObservation::new("lib.rs - workspace - Visual Studio Code", "Code")),
        ScriptStep::Observe(WindowObservation::new("lib.rs - workspace - Visual Studio Code", "Code")),
        ScriptStep::Fail("window server unavailable".to_string()),
        ScriptStep::Observe(
            WindowObservation::new("Claude", "Google Chrome").with_url("https://claude.ai/new"),
        ),
        ScriptStep::Nothing,
        ScriptStep::Observe(WindowObservation::new("Terminal", "Terminal")),
    ]));

    let monitor = FocusMonitor::new(source, Arc::new(AppIdentifier::builtin()), buffer.clone())
        .with_transparency(log.clone());
    monitor.subscribe(|change| {
        println!(
            "  focus  {} -> {}",
            change.previous_app.as_deref().unwrap_or("-"),
            change.app_id
        );
        Ok(())
    });

    let detector = PromptDetector::new(DetectorConfig::default(), buffer.clone())
        .with_transparency(log.clone());
    detector.subscribe_word_count(|count| {
        println!("  words  {count}");
        Ok(())
    });
    detector.subscribe_submissions(|submission| {
        println!("  prompt sent to {}", submission.app_id);
        Ok(())
    });

    let input = InputContext::default();
    monitor.start(SESSION, Duration::from_millis(200));
    detector.start(SESSION, &input);

    // Let the monitor reach the Claude tab before typing.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let editor = ElementSnapshot::new(1, "div")
        .with_class("ProseMirror")
        .editable();
    input.dispatch(PageEvent::focus("claude.ai", editor.clone()));
    input.dispatch(PageEvent::input(
        "claude.ai",
        editor.clone().with_text("explain lifetimes in"),
    ));
    input.dispatch(PageEvent::input(
        "claude.ai",
        editor.clone().with_text("explain lifetimes in one paragraph"),
    ));
    tokio::time::sleep(Duration::from_millis(300)).await;
    input.dispatch(PageEvent::key_down("claude.ai", editor, KeyPress::ctrl_enter()));

    tokio::time::sleep(Duration::from_millis(1000)).await;

    monitor.dispose();
    detector.dispose();
    buffer.flush().await;

    println!();
    println!("Delivery attempts: {}", memory.attempts());
    for (i, batch) in memory.batches().iter().enumerate() {
        let apps: Vec<&str> = batch.iter().map(|e| e.app_id()).collect();
        println!("  batch {}: {}", i + 1, apps.join(", "));
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&buffer.stats())?);
    println!();
    println!("{}", log.summary());

    Ok(())
}
