//! `centinela` – home-security bridge daemon.
//!
//! 1. Loads `~/.centinela/config.toml` (or `$CENTINELA_CONFIG`) and applies
//!    environment overrides. `--print-config` prints the result and exits.
//! 2. Initialises structured logging (optional OTLP export).
//! 3. Starts the bridge loop on an in-process retained bus and serves the
//!    polling API plus the WebSocket gateway on one port.
//! 4. Intercepts **Ctrl-C** / SIGTERM and shuts down cleanly.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use centinela_middleware::RetainedBus;
use centinela_runtime::{BridgeConfig, init_tracing, spawn};
use centinela_server::CentinelaServer;

#[tokio::main]
async fn main() -> ExitCode {
    let print_config = std::env::args().skip(1).any(|a| a == "--print-config");

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    if print_config {
        return match config::to_toml(&cfg) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", "Config error".red());
                ExitCode::FAILURE
            }
        };
    }

    // Held until main returns so pending spans are flushed.
    let telemetry = init_tracing("centinela");

    print_banner(&cfg);
    info!(
        path = %config::config_path().display(),
        port = cfg.port,
        initial_mode = ?cfg.initial_security_mode,
        bus_capacity = cfg.bus_capacity,
        otlp_export = telemetry.is_exporting(),
        "configuration loaded"
    );

    // ── Shutdown signal ───────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown unavailable");
    }

    // ── Bridge + server ───────────────────────────────────────────────────
    let bus = Arc::new(RetainedBus::new(cfg.bus_capacity));
    let handle = spawn(
        Arc::clone(&bus),
        BridgeConfig {
            initial_mode: cfg.initial_security_mode,
            announce_on_start: cfg.announce_on_start,
        },
    );
    let server = CentinelaServer::new(handle, (*bus).clone()).with_port(cfg.port);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server stopped");
                return ExitCode::FAILURE;
            }
        }
        _ = shutdown_rx.changed() => {
            println!();
            println!("{}", "  ⚠  Shutdown requested – stopping Centinela.".yellow().bold());
            info!("shutdown");
        }
    }

    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(cfg: &config::Config) {
    println!();
    println!("  {} {}",
        "Centinela".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Home security bridge");
    println!();
    println!("  Polling API   {}", format!("http://0.0.0.0:{}/api/", cfg.port).bold());
    println!("  Dashboard     {}", format!("http://0.0.0.0:{}/", cfg.port).bold());
    println!(
        "  Initial mode  {}",
        cfg.initial_security_mode.payload().bold()
    );
    println!();
}
