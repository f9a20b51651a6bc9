//! Workflow Sensor Agent CLI
//!
//! Privacy-first workflow telemetry for proctored sessions.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use workflow_sensor_agent::{
    collector::{CommandSource, NoopSource, WindowObservation, WindowSource},
    config::Config,
    delivery::{DeliveryBuffer, DeliverySink, JsonlSink},
    monitor::{FocusMonitor, InputContext, PromptDetector},
    signatures::{AppIdentifier, SignatureRegistry},
    transparency::{create_shared_log_with_persistence, AuditedSink, SharedTransparencyLog},
    PRIVACY_DECLARATION, VERSION,
};

#[cfg(feature = "gateway")]
use workflow_sensor_agent::delivery::{GatewayConfig, HttpSink};

#[derive(Parser)]
#[command(name = "workflow-sensor")]
#[command(version = VERSION)]
#[command(about = "Privacy-first workflow telemetry for proctored sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring a session
    Start {
        /// Session identifier (generated if not specified)
        #[arg(long)]
        session: Option<String>,

        /// Command printing the focused window as JSON, e.g. "xdotool-json --active"
        #[arg(long)]
        source_command: Option<String>,

        /// File receiving delivered batches (JSON lines)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Include prompt text in submission events (requires consent)
        #[arg(long)]
        capture_prompt_text: bool,

        /// Deliver to the collection gateway (requires gateway feature)
        #[arg(long)]
        gateway: bool,

        /// Gateway port (auto-detected from runtime dir if not specified)
        #[arg(long)]
        gateway_port: Option<u16>,

        /// Gateway token (auto-detected from runtime dir if not specified)
        #[arg(long)]
        gateway_token: Option<String>,

        /// Serve the local event endpoint on this port (requires server feature)
        #[arg(long)]
        listen: Option<u16>,
    },

    /// Classify one window observation
    Identify {
        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        process: String,

        #[arg(long)]
        url: Option<String>,
    },

    /// List the built-in application signatures in match order
    Signatures,

    /// Pause data collection
    Pause,

    /// Resume data collection
    Resume,

    /// Show current collection status
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start {
            session,
            source_command,
            output,
            capture_prompt_text,
            gateway,
            gateway_port,
            gateway_token,
            listen,
        } => cmd_start(StartOptions {
            session,
            source_command,
            output,
            capture_prompt_text,
            gateway,
            gateway_port,
            gateway_token,
            listen,
        }),
        Commands::Identify {
            title,
            process,
            url,
        } => {
            cmd_identify(title, process, url);
            Ok(())
        }
        Commands::Signatures => {
            cmd_signatures();
            Ok(())
        }
        Commands::Pause => cmd_set_paused(true),
        Commands::Resume => cmd_set_paused(false),
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

struct StartOptions {
    session: Option<String>,
    source_command: Option<String>,
    output: Option<PathBuf>,
    capture_prompt_text: bool,
    gateway: bool,
    gateway_port: Option<u16>,
    gateway_token: Option<String>,
    listen: Option<u16>,
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("could not load configuration, using defaults: {e}");
        Config::default()
    })
}

fn cmd_start(options: StartOptions) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;
    runtime.block_on(run_session(options))
}

async fn run_session(options: StartOptions) -> anyhow::Result<()> {
    println!("Workflow Sensor Agent v{VERSION}");
    println!();

    let mut config = load_config();
    if options.capture_prompt_text {
        config.detector.capture_prompt_text = true;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let session_id = options
        .session
        .clone()
        .unwrap_or_else(|| format!("SESS-{}", Utc::now().timestamp_millis()));

    let transparency_log =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));

    let sink = build_sink(&options, &config, &session_id, transparency_log.clone()).await?;
    let buffer = DeliveryBuffer::new(config.buffer.clone(), sink)
        .context("invalid buffer configuration")?;
    buffer.set_session(session_id.clone());

    let source = build_source(&options, &config);
    let monitor = FocusMonitor::new(source, Arc::new(AppIdentifier::builtin()), buffer.clone())
        .with_transparency(transparency_log.clone());
    monitor.subscribe(|change| {
        println!(
            "[{}] Focus: {}",
            change.timestamp.format("%H:%M:%S"),
            change.app_id
        );
        Ok(())
    });

    let input = InputContext::default();
    let detector = PromptDetector::new(config.detector.clone(), buffer.clone())
        .with_transparency(transparency_log.clone());
    detector.subscribe_submissions(|submission| {
        println!(
            "[{}] Prompt submitted to {}",
            submission.timestamp.format("%H:%M:%S"),
            submission.app_id
        );
        Ok(())
    });

    #[cfg(feature = "server")]
    let server_shutdown = match options.listen {
        Some(port) => {
            let state = workflow_sensor_agent::server::ServerState::new(buffer.clone())
                .with_input(input.clone())
                .with_transparency(transparency_log.clone());
            let (addr, shutdown) = workflow_sensor_agent::server::run(
                workflow_sensor_agent::server::ServerConfig::new(port),
                state,
            )
            .await?;
            println!("  Event endpoint: http://{addr}");
            Some(shutdown)
        }
        None => None,
    };
    #[cfg(not(feature = "server"))]
    if options.listen.is_some() {
        eprintln!("Warning: --listen ignored (server feature not enabled at compile time)");
    }

    println!("  Session: {session_id}");
    println!("  Poll interval: {}ms", config.poll_interval.as_millis());
    println!(
        "  Prompt text capture: {}",
        if config.detector.capture_prompt_text {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let cancel = CancellationToken::new();
    let c = cancel.clone();
    ctrlc::set_handler(move || c.cancel()).context("Error setting Ctrl+C handler")?;

    // Support pause/resume from another process by polling the config file.
    let mut paused = config.paused;
    if paused {
        println!("Collection is currently paused.");
        println!("Run `workflow-sensor resume` to start collecting.");
        println!();
    } else {
        monitor.start(session_id.clone(), config.poll_interval);
        detector.start(session_id.clone(), &input);
    }

    let mut config_check = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = config_check.tick() => {
                let Ok(current) = Config::load() else { continue };
                if current.paused == paused {
                    continue;
                }
                paused = current.paused;
                if paused {
                    println!();
                    println!("Pausing collection...");
                    monitor.stop();
                    detector.stop();
                } else {
                    println!();
                    println!("Resuming collection...");
                    monitor.start(session_id.clone(), config.poll_interval);
                    detector.start(session_id.clone(), &input);
                }
            }
        }
    }

    println!();
    println!("Stopping collection...");
    monitor.dispose();
    detector.dispose();

    #[cfg(feature = "server")]
    if let Some(shutdown) = server_shutdown {
        let _ = shutdown.send(());
    }

    let pending = buffer.stats();
    if pending.pending + pending.failed > 0 {
        println!(
            "Delivering {} remaining event(s)...",
            pending.pending + pending.failed
        );
    }
    if tokio::time::timeout(Duration::from_secs(30), buffer.flush())
        .await
        .is_err()
    {
        eprintln!("Warning: Gave up waiting for delivery");
    }
    buffer.cleanup();

    let stats = buffer.stats();
    let lost = stats.dropped_after_retries
        + stats.dropped_on_overflow
        + (stats.pending + stats.failed) as u64;
    transparency_log.record_events_dropped(lost);
    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());
    Ok(())
}

fn build_source(options: &StartOptions, config: &Config) -> Arc<dyn WindowSource> {
    let argv: Option<Vec<String>> = options
        .source_command
        .as_ref()
        .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
        .or_else(|| config.source_command.clone());

    let source = argv.as_deref().and_then(CommandSource::from_argv);
    match source {
        Some(source) => {
            println!("  Window source: {}", argv.unwrap_or_default().join(" "));
            Arc::new(source)
        }
        None => {
            eprintln!("Warning: No window source command configured");
            eprintln!("Focus changes will not be observed.");
            Arc::new(NoopSource::new())
        }
    }
}

async fn build_sink(
    options: &StartOptions,
    config: &Config,
    session_id: &str,
    log: SharedTransparencyLog,
) -> anyhow::Result<Arc<dyn DeliverySink>> {
    #[cfg(feature = "gateway")]
    if options.gateway {
        let gateway_config = match (options.gateway_port, options.gateway_token.clone()) {
            (Some(port), Some(token)) => GatewayConfig::new("127.0.0.1", port, token),
            _ => GatewayConfig::from_runtime_dir(&config.data_path.join("runtime"))?,
        };
        let sink = HttpSink::new(gateway_config)?;
        println!("  Gateway: {}", sink.config().url());
        println!("  Device ID: {}", sink.device_id());
        match sink.test_connection().await {
            Ok(true) => println!("  Gateway connection: OK"),
            Ok(false) => eprintln!("Warning: Gateway health check failed"),
            Err(e) => eprintln!("Warning: Could not connect to gateway: {e}"),
        }
        return Ok(Arc::new(AuditedSink::new(sink, log)));
    }

    #[cfg(not(feature = "gateway"))]
    if options.gateway || options.gateway_port.is_some() || options.gateway_token.is_some() {
        eprintln!("Warning: gateway flags ignored (gateway feature not enabled at compile time)");
    }

    let path = options.output.clone().unwrap_or_else(|| {
        config
            .export_path
            .join(format!("session_{}.jsonl", sanitize(session_id)))
    });
    println!("  Output: {}", path.display());
    Ok(Arc::new(AuditedSink::new(JsonlSink::new(path), log)))
}

fn sanitize(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn cmd_identify(title: String, process: String, url: Option<String>) {
    let mut observation = WindowObservation::new(title, process);
    if let Some(url) = url {
        observation = observation.with_url(url);
    }
    let identifier = AppIdentifier::builtin();
    println!("{}", identifier.identify(&observation));
}

fn cmd_signatures() {
    let registry = SignatureRegistry::builtin();
    println!("{:<16} {:<12} {:>7} {:>10} {:>5}", "ID", "KIND", "TITLES", "PROCESSES", "URLS");
    for signature in registry.iter() {
        println!(
            "{:<16} {:<12} {:>7} {:>10} {:>5}",
            signature.id,
            if signature.is_browser() {
                "browser"
            } else {
                "application"
            },
            signature.title_patterns.len(),
            signature.process_names.len(),
            signature.url_substrings.len()
        );
    }
}

fn cmd_set_paused(paused: bool) -> anyhow::Result<()> {
    let mut config = load_config();
    config.paused = paused;
    config.save().context("Error saving config")?;
    if paused {
        println!("Collection paused. Use 'workflow-sensor resume' to continue.");
    } else {
        println!("Collection resumed.");
    }
    Ok(())
}

fn cmd_status() {
    let config = load_config();

    println!("Workflow Sensor Agent Status");
    println!("============================");
    println!();

    println!("Configuration:");
    println!("  Poll interval: {}ms", config.poll_interval.as_millis());
    println!(
        "  Batch size: {} (max wait {}ms)",
        config.buffer.batch_size,
        config.buffer.max_batch_wait.as_millis()
    );
    println!(
        "  Window source: {}",
        config
            .source_command
            .as_ref()
            .map(|argv| argv.join(" "))
            .unwrap_or_else(|| "none".to_string())
    );
    println!(
        "  Prompt text capture: {}",
        if config.detector.capture_prompt_text {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Paused: {}", config.paused);
    println!();

    let stats_path = config.data_path.join("transparency.json");
    if stats_path.exists() {
        let log = create_shared_log_with_persistence(stats_path);
        let stats = log.stats();
        println!("Cumulative Statistics:");
        println!("  Focus changes: {}", stats.focus_events);
        println!("  Prompt submissions: {}", stats.prompt_submissions);
        println!("  Batches delivered: {}", stats.batches_delivered);
        println!("  Events delivered: {}", stats.events_delivered);
        println!("  Events dropped: {}", stats.events_dropped);
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
