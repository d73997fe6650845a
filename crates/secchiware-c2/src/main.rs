// crates/secchiware-c2/src/main.rs
// ============================================================================
// Module: Secchiware C2 Entry Point
// Description: Binary wiring for the command-and-control service.
// Purpose: Load config, assemble state, spawn the sweeper, and serve.
// Dependencies: clap, tokio, secchiware-c2
// ============================================================================

//! ## Overview
//! The C2 binary takes one argument, the configuration file path. Exit
//! codes: 0 for a normal shutdown, 1 for startup misconfiguration, 2 for
//! fatal runtime failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use secchiware_broker::MemoryBroker;
use secchiware_bundle::TestRegistry;
use secchiware_c2::NodeClient;
use secchiware_c2::NoopMetrics;
use secchiware_c2::ServerState;
use secchiware_c2::build_router;
use secchiware_c2::sweeper;
use secchiware_config::C2Config;
use secchiware_core::KeyId;
use secchiware_core::signing::StaticSecrets;
use secchiware_store_sqlite::SqliteSessionStore;
use tokio::net::TcpListener;

// ============================================================================
// SECTION: CLI
// ============================================================================

/// Secchiware C2: coordinates transparency-test nodes.
#[derive(Debug, Parser)]
#[command(name = "secchiware-c2", version)]
struct Args {
    /// Path to the C2 configuration file.
    config: PathBuf,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let args = Args::parse();
    run(&args.config)
}

/// Writes a diagnostic line to standard error.
fn log_line(message: &str) {
    let _ = writeln!(io::stderr(), "secchiware-c2: {message}");
}

/// Loads configuration and drives the service lifecycle.
fn run(config_path: &Path) -> ExitCode {
    let config = match C2Config::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            log_line(&format!("startup misconfiguration: {err}"));
            return ExitCode::from(1);
        }
    };
    let store = match SqliteSessionStore::open(&config.database_path) {
        Ok(store) => store,
        Err(err) => {
            log_line(&format!("database unusable: {err}"));
            return ExitCode::from(1);
        }
    };
    let repository = match TestRegistry::open(&config.repository_root) {
        Ok(repository) => repository,
        Err(err) => {
            log_line(&format!("repository root unusable: {err}"));
            return ExitCode::from(1);
        }
    };
    let node_client = match NodeClient::new(Duration::from_millis(config.timeout_ms)) {
        Ok(client) => client,
        Err(err) => {
            log_line(&format!("node client init failed: {err}"));
            return ExitCode::from(1);
        }
    };

    let mut node_secrets = StaticSecrets::new();
    for (key_id, secret) in &config.node_secrets {
        node_secrets = node_secrets.with_secret(key_id.clone(), secret.clone().into_bytes());
    }
    let state = ServerState::builder()
        .store(Arc::new(store))
        .broker(Arc::new(MemoryBroker::new()))
        .repository(repository)
        .client_secrets(
            StaticSecrets::new()
                .with_secret(config.client_key_id.clone(), config.client_secret.clone().into_bytes()),
        )
        .node_secrets(node_secrets)
        .c2_key_id(KeyId::new(config.c2_key_id.clone()))
        .skew(Duration::from_secs(config.skew_secs))
        .locks(
            Duration::from_secs(config.lock_ttl_secs),
            Duration::from_millis(config.lock_wait_ms),
        )
        .node_client(node_client)
        .allowed_origins(config.allowed_origins.clone())
        .metrics(Arc::new(NoopMetrics))
        .build();
    let state = match state {
        Ok(state) => Arc::new(state),
        Err(err) => {
            log_line(&format!("state assembly failed: {err}"));
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            log_line(&format!("runtime init failed: {err}"));
            return ExitCode::from(2);
        }
    };
    runtime.block_on(serve(config, state))
}

// ============================================================================
// SECTION: Service Lifecycle
// ============================================================================

/// Binds the listener, spawns the sweeper, and serves until interrupted.
async fn serve(config: C2Config, state: Arc<ServerState>) -> ExitCode {
    let listener =
        match TcpListener::bind((config.listen_ip.as_str(), config.listen_port)).await {
            Ok(listener) => listener,
            Err(err) => {
                log_line(&format!(
                    "bind failed on {}:{}: {err}",
                    config.listen_ip, config.listen_port
                ));
                return ExitCode::from(1);
            }
        };

    let sweeper_state = Arc::clone(&state);
    let liveness = config.liveness.clone();
    let sweeper_task = tokio::spawn(sweeper::run_sweeper(sweeper_state, liveness));

    let router = build_router(state);
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let served = axum::serve(listener, router).with_graceful_shutdown(shutdown).await;
    sweeper_task.abort();
    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log_line(&format!("listener failed: {err}"));
            ExitCode::from(2)
        }
    }
}
