//! Surface Dispatch - reactive control-surface runtime
//!
//! Routes MIDI from a control surface through the dispatch core into a
//! simulated DAW host, polling host state back onto the surface.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use surface_dispatch::cli::{self, Command};
use surface_dispatch::config::{AppConfig, ConfigWatcher, MidiConfig, DEFAULT_CONFIG_PATH};
use surface_dispatch::host::ConsoleHost;
use surface_dispatch::ingress::{self, MidiIngress, INGRESS_QUEUE};
use surface_dispatch::layout::{default_layout, SurfaceLayout};
use surface_dispatch::midi::MidiMsg;
use surface_dispatch::surface::Surface;

/// Surface Dispatch - drive a DAW host from an event-driven control surface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<String>,

    /// List available MIDI input ports
    #[arg(long)]
    list_ports: bool,

    /// Validate configuration and layout, then exit
    #[arg(long)]
    check: bool,

    /// Start the interactive console even when a MIDI port is configured
    #[arg(long)]
    repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Keep the file writer alive until exit
    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref())?;

    info!("Starting Surface Dispatch v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if args.list_ports {
        ingress::print_ports(&MidiConfig::default().client_name, None);
        return Ok(());
    }

    if args.check {
        return check_config(&args.config).await;
    }

    let (config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded with hot-reload enabled");

    run_app((*initial_config).clone(), config_watcher, args.repl, shutdown_signal()).await?;

    info!("Surface Dispatch shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    mut config_watcher: ConfigWatcher,
    force_repl: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let host = Arc::new(ConsoleHost::new());
    let layout = load_layout(&config).await?;
    let mut surface = Surface::new(host.clone(), config.clone(), layout).context("Failed to build surface")?;

    let (midi_tx, mut midi_rx) = mpsc::channel::<MidiMsg>(INGRESS_QUEUE);
    let ingress = match &config.midi.input_port {
        Some(pattern) => {
            let ingress = MidiIngress::connect(&config.midi.client_name, pattern, midi_tx)
                .with_context(|| format!("Failed to open MIDI input '{}'", pattern))?;
            info!("✅ Listening on {}", ingress.port().name);
            Some(ingress)
        },
        None => {
            info!("No MIDI input configured, console only");
            None
        },
    };

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(64);
    if force_repl || ingress.is_none() {
        cli::spawn_repl(cmd_tx);
    } else {
        drop(cmd_tx);
    }

    let mut idle = idle_interval(config.runtime.idle_interval_ms);

    info!("Ready to process MIDI events!");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(mut msg) = midi_rx.recv() => {
                surface.on_midi_msg(&mut msg);
            }

            _ = idle.tick() => {
                let report = surface.on_idle();
                if report.changed > 0 {
                    debug!("Idle tick: {} of {} polled paths changed", report.changed, report.polled);
                }
            }

            Some(command) = cmd_rx.recv() => {
                if !cli::apply(&surface, &host, command) {
                    info!("Console requested exit");
                    break;
                }
            }

            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, rebuilding surface...");
                let layout = match load_layout(&new_config).await {
                    Ok(layout) => layout,
                    Err(e) => {
                        warn!("⚠️  Failed to load layout (keeping old config): {:#}", e);
                        continue;
                    }
                };
                let interval_ms = new_config.runtime.idle_interval_ms;
                match surface.rebuild(new_config, layout) {
                    Ok(()) => {
                        idle = idle_interval(interval_ms);
                        info!("✅ Configuration reloaded");
                    }
                    Err(e) => warn!("⚠️  Failed to reload config (keeping old config): {}", e),
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    surface.on_deinit();
    Ok(())
}

fn idle_interval(ms: u64) -> Interval {
    let mut idle = interval(Duration::from_millis(ms));
    idle.set_missed_tick_behavior(MissedTickBehavior::Skip);
    idle
}

async fn load_layout(config: &AppConfig) -> Result<SurfaceLayout> {
    match &config.layout {
        Some(path) => SurfaceLayout::load_from_path(path)
            .await
            .with_context(|| format!("Failed to load layout: {}", path)),
        None => default_layout().context("Embedded layout is invalid"),
    }
}

/// Validate config + layout by assembling a surface against the console host
async fn check_config(path: &str) -> Result<()> {
    println!("\n{}", "=== Checking Configuration ===".bold().cyan());

    let config = AppConfig::load(path).await?;
    println!("  {} {}", "✓".green(), path);

    let layout = load_layout(&config).await?;
    println!(
        "  {} layout: {} controls in {} groups",
        "✓".green(),
        layout.len().to_string().green(),
        layout.groups().count()
    );
    for group in layout.groups() {
        let count = layout.group(group).map(|g| g.len()).unwrap_or(0);
        println!("      {} ({} controls)", group.yellow(), count);
    }

    let host = Arc::new(ConsoleHost::new());
    let unknown_actions: Vec<&str> = config
        .bindings
        .iter()
        .filter(|b| !host.api().has_action(&b.action))
        .map(|b| b.action.as_str())
        .collect();

    let surface = Surface::new(host, config.clone(), layout).context("Surface assembly failed")?;
    println!(
        "  {} surface: {} controls, {} routed identities",
        "✓".green(),
        surface.control_names().len(),
        surface.registry().len()
    );
    println!(
        "  {} {} pad banks, {} combos, {} bindings, {} indicators",
        "✓".green(),
        config.pads.len(),
        config.combos.len(),
        config.bindings.len(),
        config.indicators.len()
    );

    for action in &unknown_actions {
        println!("  {} unknown host action '{}'", "!".yellow(), action);
    }
    println!();

    Ok(())
}

fn init_logging(level: &str, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
