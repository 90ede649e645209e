//! Thermarb Daemon (thermarbd)
//!
//! Hosts the arbitration engine and the mode publisher behind a Unix
//! domain socket. Policy processes submit requests and events as
//! newline-delimited JSON; every request is applied by a single engine task
//! in arrival order.
//!
//! # Security Model
//! - **Socket**: Unix domain socket restricted to owner and group (0660)
//! - **Validation**: Every request is validated before it reaches the engine
//! - **Audit**: Peer credential logging (UID/GID/PID) for all mutating requests
//! - **Limits**: Connection limits, message size limits, read/write timeouts
//! - **Isolation**: Restrictive umask, working directory set to /

mod server;
mod work_queue;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use work_queue::{spawn_delivery, spawn_engine, ChannelSink, Engine};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_SOCKET_PATH: &str = "/run/thermarb.sock";

const LOG_ENV: &str = "THERMARB_LOG";

// ============================================================================
// Security Hardening
// ============================================================================

/// Group members may connect; others get nothing
fn set_secure_umask() {
    // SAFETY: umask only replaces the process file creation mask.
    unsafe { libc::umask(0o007) };
    debug!("Umask set to 0007");
}

fn secure_working_directory() {
    if std::env::set_current_dir("/").is_err() {
        warn!("Could not chdir to /");
    }
}

/// Validate socket path for security
fn validate_socket_path(path: &str) -> Result<(), String> {
    let p = Path::new(path);

    if !p.is_absolute() {
        return Err("Socket path must be absolute".into());
    }

    if path.contains("..") {
        return Err("Socket path contains path traversal".into());
    }

    if path.contains('\0') {
        return Err("Socket path contains null byte".into());
    }

    let safe_dirs = ["/run/", "/var/run/", "/tmp/"];
    if !safe_dirs.iter().any(|d| path.starts_with(d)) {
        return Err(format!("Socket path must be under {:?}", safe_dirs));
    }

    if let Some(parent) = p.parent() {
        if !parent.exists() {
            return Err(format!("Parent directory does not exist: {:?}", parent));
        }
    }

    if p.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        return Err("Socket path is a symlink - refusing for security".into());
    }

    Ok(())
}

fn cleanup(socket_path: &str) {
    if Path::new(socket_path).exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("Failed to remove socket: {}", e);
        }
    }
    info!("Cleanup complete");
}

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("thermarbd {} - Thermarb arbitration daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    thermarbd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -s, --socket PATH   Socket path (default {})", DEFAULT_SOCKET_PATH);
    eprintln!("    -c, --config PATH   Configuration file (default: search order)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}        Log filter (trace, debug, info, warn, error)", LOG_ENV);
    eprintln!("    {}     Configuration file path", thermarb::constants::paths::CONFIG_ENV);
}

fn init_logging(log_level: &str) -> bool {
    use tracing_subscriber::prelude::*;

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // PHASE 0: Panics are logged before unwinding
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
    }));

    // PHASE 1: Process hardening
    set_secure_umask();
    secure_working_directory();

    // PHASE 2: Arguments
    let args: Vec<String> = std::env::args().collect();
    let mut socket_path = DEFAULT_SOCKET_PATH.to_string();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                println!("thermarbd {}", VERSION);
                return Ok(());
            }
            "-s" | "--socket" => {
                i += 1;
                socket_path = args
                    .get(i)
                    .cloned()
                    .context("--socket requires a path argument")?;
            }
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).context("--config requires a path argument")?;
                config_path = Some(PathBuf::from(path));
            }
            arg => {
                print_help();
                anyhow::bail!("Unknown argument: {}", arg);
            }
        }
        i += 1;
    }

    // PHASE 3: Logging
    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let use_journald = init_logging(&log_level);

    info!("STARTUP: thermarbd {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });

    if let Err(e) = validate_socket_path(&socket_path) {
        error!("Invalid socket path: {}", e);
        anyhow::bail!("Invalid socket path: {}", e);
    }

    // PHASE 4: Configuration
    let config = match &config_path {
        Some(path) => thermarb::load_config_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => thermarb::load_config().context("loading configuration")?,
    };
    info!(
        "STARTUP: {} domain(s), scenario modes [{}], gaming modes [{}]",
        config.domains.len(),
        config.supported_scenario_modes.len(),
        config.supported_gaming_modes.len()
    );

    // PHASE 5: Engine and notification delivery
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let delivery_handle = spawn_delivery(notify_rx);
    let engine = Engine::new(&config, ChannelSink::new(notify_tx)).context("building engine")?;
    info!("STARTUP: Initial modes {:?}", engine.modes());
    let (queue, engine_handle) = spawn_engine(engine);

    // PHASE 6: SIGTERM cleanup
    let socket_path_clone = socket_path.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        cleanup(&socket_path_clone);
        std::process::exit(0);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    info!("STARTUP: Socket path: {}", socket_path);
    info!("STARTUP: PID: {}", std::process::id());

    // PHASE 7: Serve until shutdown
    let result = server::run_server(&socket_path, queue).await;

    // Dropping the last queue handle ends the engine, which closes delivery
    let _ = engine_handle.await;
    let _ = delivery_handle.await;
    cleanup(&socket_path);

    if let Err(e) = &result {
        error!("Server error: {}", e);
    }
    result
}
