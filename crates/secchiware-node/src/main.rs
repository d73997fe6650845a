// crates/secchiware-node/src/main.rs
// ============================================================================
// Module: Secchiware Node Entry Point
// Description: Binary wiring for the node service.
// Purpose: Load config, register with the C2, serve, and exit cleanly.
// Dependencies: clap, tokio, secchiware-node
// ============================================================================

//! ## Overview
//! The node binary takes one argument, the configuration file path. Exit
//! codes: 0 for a normal shutdown (including the stand-alone fallback), 1
//! for startup misconfiguration, 2 for fatal runtime failures. A fatal init
//! failure still attempts the stand-alone fallback before aborting.

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
use secchiware_config::NodeConfig;
use secchiware_core::EnvironmentEndpoint;
use secchiware_core::KeyId;
use secchiware_core::PlatformInfo;
use secchiware_core::RegistrationRequest;
use secchiware_core::signing::StaticSecrets;
use secchiware_node::C2Client;
use secchiware_node::NoopMetrics;
use secchiware_node::ServerState;
use secchiware_node::build_router;
use secchiware_node::run_standalone;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: CLI
// ============================================================================

/// Secchiware node: transparency tests inside the analysis environment.
#[derive(Debug, Parser)]
#[command(name = "secchiware-node", version)]
struct Args {
    /// Path to the node configuration file.
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
    let _ = writeln!(io::stderr(), "secchiware-node: {message}");
}

/// Loads configuration and drives the service lifecycle.
fn run(config_path: &Path) -> ExitCode {
    let config = match NodeConfig::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            log_line(&format!("startup misconfiguration: {err}"));
            return ExitCode::from(1);
        }
    };
    let registry = match TestRegistry::open(&config.test_root) {
        Ok(registry) => registry,
        Err(err) => {
            log_line(&format!("test root unusable: {err}"));
            return ExitCode::from(1);
        }
    };
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            log_line(&format!("runtime init failed: {err}"));
            return fallback(&registry, ExitCode::from(2));
        }
    };
    runtime.block_on(serve(config, registry))
}

/// Attempts the stand-alone fallback, then returns the given exit code.
fn fallback(registry: &TestRegistry, code: ExitCode) -> ExitCode {
    match run_standalone(registry) {
        Ok(()) => code,
        Err(err) => {
            log_line(&format!("stand-alone fallback failed: {err}"));
            ExitCode::from(2)
        }
    }
}

// ============================================================================
// SECTION: Service Lifecycle
// ============================================================================

/// Binds, registers, serves, and deregisters.
async fn serve(config: NodeConfig, registry: TestRegistry) -> ExitCode {
    let listener =
        match TcpListener::bind((config.listen_ip.as_str(), config.listen_port)).await {
            Ok(listener) => listener,
            Err(err) => {
                log_line(&format!("bind failed on {}:{}: {err}", config.listen_ip, config.listen_port));
                return fallback(&registry, ExitCode::from(2));
            }
        };

    let client = match C2Client::new(
        &config.c2_host,
        config.c2_port,
        KeyId::new(config.key_id.clone()),
        config.secret.clone().into_bytes(),
        Duration::from_millis(config.timeout_ms),
    ) {
        Ok(client) => client,
        Err(err) => {
            log_line(&format!("c2 client init failed: {err}"));
            return fallback(&registry, ExitCode::from(2));
        }
    };

    let endpoint = EnvironmentEndpoint::new(config.listen_ip.clone(), config.listen_port);
    let registration = RegistrationRequest {
        ip: endpoint.ip.clone(),
        port: endpoint.port,
        platform: PlatformInfo::gather(),
    };
    if let Err(err) = client.register(&registration).await {
        log_line(&format!("registration failed, entering stand-alone mode: {err}"));
        return fallback(&registry, ExitCode::SUCCESS);
    }

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let secrets = StaticSecrets::new()
        .with_secret(config.c2_key_id.clone(), config.c2_secret.clone().into_bytes());
    let state = Arc::new(ServerState::new(
        registry,
        Arc::new(MemoryBroker::new()),
        secrets,
        Duration::from_secs(config.skew_secs),
        shutdown_tx,
        Arc::new(NoopMetrics),
    ));
    let router = build_router(Arc::clone(&state));

    let shutdown = async move {
        tokio::select! {
            _ = shutdown_rx.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    };
    let served = axum::serve(listener, router).with_graceful_shutdown(shutdown).await;

    if let Err(err) = client.deregister(&endpoint).await {
        log_line(&format!("deregistration failed: {err}"));
    }
    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log_line(&format!("listener failed: {err}"));
            ExitCode::from(2)
        }
    }
}
