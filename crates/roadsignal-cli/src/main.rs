//! `roadsignal` – traffic-signal relay.
//!
//! Reads signal lines from the controller (or the built-in mock), shows them
//! on a terminal light panel and pushes each one as JSON to every WebSocket
//! client on `ws://<ws_host>:<ws_port>`.
//!
//! 1. Loads `~/.roadsignal/config.toml`, writing defaults on first run.
//! 2. Starts the broadcast context and the WebSocket server on Tokio.
//! 3. Starts the ingestion thread once the broadcast context is up.
//! 4. Runs until Ctrl-C (exit 0) or until ingestion fails (exit 1).

mod config;
mod telemetry;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use roadsignal_display::TerminalDisplay;
use roadsignal_hal::{DeviceSink, DeviceSource, EventSource, MockDevice};
use roadsignal_hub::{
    BroadcastHub, HubConfig, HubHandle, HubService, IngestLoop, IngestSummary, RelayBridge,
    WsServer, relay,
};
use roadsignal_types::RelayError;

/// Extra time the ingestion thread gets, beyond one read window, to notice
/// the stop flag.
const INGEST_GRACE: Duration = Duration::from_millis(500);

type IngestJoin = Result<thread::Result<Result<IngestSummary, RelayError>>, JoinError>;

fn main() {
    let guard = telemetry::init_tracing("roadsignal");

    print_banner();

    let code = match run() {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "relay stopped");
            eprintln!("{}: {}", "Fatal".red().bold(), e);
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}

fn run() -> Result<(), RelayError> {
    let cfg = load_config();

    // ── Shutdown signalling ───────────────────────────────────────────────
    // The ingestion thread polls `stop`; Tokio tasks watch `shutdown_tx`.
    let stop = Arc::new(AtomicBool::new(false));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let stop_ctrlc = stop.clone();
    let shutdown_ctrlc = shutdown_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        stop_ctrlc.store(true, Ordering::SeqCst);
        shutdown_ctrlc.send_replace(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Broadcast side ────────────────────────────────────────────────────
    let mut hub = BroadcastHub::new(HubConfig {
        send_timeout: cfg.send_timeout(),
        outbox_capacity: cfg.outbox_capacity,
    });
    let mut display_thread = None;
    if cfg.display {
        let (display, thread) = TerminalDisplay::spawn()
            .map_err(|e| RelayError::Server(format!("cannot start display thread: {e}")))?;
        hub = hub.with_projector(Arc::new(display));
        display_thread = Some(thread);
    }
    let (service, bridge, handle) = relay(hub);

    // ── Device side ───────────────────────────────────────────────────────
    let ingest = build_ingest(&cfg, bridge, stop.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("roadsignal-broadcast")
        .build()
        .map_err(|e| RelayError::Server(format!("cannot start runtime: {e}")))?;

    let outcome = runtime.block_on(serve(
        &cfg,
        service,
        handle,
        ingest,
        stop,
        shutdown_tx,
        shutdown_rx,
    ));
    runtime.shutdown_timeout(INGEST_GRACE);

    if let Some(thread) = display_thread {
        let _ = thread.join();
    }

    if outcome.is_ok() {
        println!("{}", "  ✓ Relay stopped.".green());
    }
    outcome
}

fn load_config() -> config::Config {
    match config::load_or_init() {
        Ok((cfg, created)) => {
            let path = config::config_path().display().to_string();
            if created {
                println!("  {} Default config written to {}", "✓".green().bold(), path.bold());
            } else {
                println!("  Config loaded from {}", path.bold());
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn build_ingest(
    cfg: &config::Config,
    bridge: RelayBridge,
    stop: Arc<AtomicBool>,
) -> Result<IngestLoop, RelayError> {
    let source: Box<dyn EventSource> = match &cfg.device_path {
        Some(path) => {
            println!(
                "  Controller: {} @ {} baud",
                path.display().to_string().bold(),
                cfg.baud_rate
            );
            Box::new(DeviceSource::open(path, cfg.baud_rate, cfg.read_timeout())?)
        }
        None => {
            println!(
                "  Controller: {} (every {} ms)",
                "mock".yellow(),
                cfg.mock_interval_ms
            );
            Box::new(MockDevice::new(cfg.mock_interval()))
        }
    };

    let mut ingest = IngestLoop::new(source, bridge, cfg.read_timeout(), stop);
    if let Some(path) = &cfg.forward_path {
        println!("  Forwarding to: {}", path.display().to_string().bold());
        ingest = ingest.with_forwarder(DeviceSink::open(
            path,
            cfg.baud_rate,
            cfg.send_timeout(),
        )?);
    }
    Ok(ingest)
}

async fn serve(
    cfg: &config::Config,
    service: HubService,
    handle: HubHandle,
    ingest: IngestLoop,
    stop: Arc<AtomicBool>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), RelayError> {
    let server = WsServer::bind(handle.clone(), cfg.ws_addr()).await?;
    let addr = server.local_addr()?;

    let hub_task = tokio::spawn(service.run(shutdown_rx.clone()));
    let server_task = tokio::spawn(server.run(shutdown_rx.clone()));

    // Ingestion starts only once the broadcast context answers.
    handle.subscriber_count().await?;
    println!("  WebSocket: {}", format!("ws://{addr}").bold().cyan());
    println!();

    let outcome = match ingest.spawn() {
        Ok(ingest_thread) => {
            let mut ingest_done = tokio::task::spawn_blocking(move || ingest_thread.join());
            let mut shutdown = shutdown_rx.clone();
            tokio::select! {
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    let grace = cfg.read_timeout() + INGEST_GRACE;
                    match tokio::time::timeout(grace, &mut ingest_done).await {
                        Ok(joined) => ingest_outcome(joined),
                        Err(_) => {
                            warn!(
                                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                                "ingestion thread did not stop in time; abandoning it"
                            );
                            Ok(())
                        }
                    }
                }
                joined = &mut ingest_done => ingest_outcome(joined),
            }
        }
        Err(e) => Err(RelayError::Transport(format!("cannot start ingestion thread: {e}"))),
    };

    stop.store(true, Ordering::SeqCst);
    shutdown_tx.send_replace(true);

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "WebSocket server ended with error"),
        Err(e) => warn!(error = %e, "WebSocket server task failed"),
    }
    if let Err(e) = hub_task.await {
        warn!(error = %e, "broadcast task failed");
    }
    outcome
}

fn ingest_outcome(joined: IngestJoin) -> Result<(), RelayError> {
    match joined {
        Ok(Ok(Ok(summary))) => {
            info!(
                lines = summary.lines,
                submitted = summary.submitted,
                dropped = summary.dropped,
                "ingestion finished"
            );
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(_)) => Err(RelayError::Transport("ingestion thread panicked".to_string())),
        Err(e) => Err(RelayError::Transport(format!("ingestion watcher failed: {e}"))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {}  {} {}",
        "( ● )".red().bold(),
        "roadsignal".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  {}  Controller → WebSocket relay", "( ● )".green().bold());
    println!();
}
