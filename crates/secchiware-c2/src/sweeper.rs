// crates/secchiware-c2/src/sweeper.rs
// ============================================================================
// Module: Liveness Sweeper
// Description: Background probing of active environments.
// Purpose: Retire sessions whose nodes stop answering.
// Dependencies: tokio, secchiware-core
// ============================================================================

//! ## Overview
//! The sweeper walks the active-node table on an interval and probes each
//! entry through the node's unauthenticated listing route. A node gets the
//! configured number of attempts with exponential backoff (1, 2, 4 seconds)
//! before its session is closed and its entry removed, both under the
//! per-endpoint mutex. The sweep is idempotent: a second worker sweeping
//! the same table either loses the mutex or finds the entry already gone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use secchiware_config::LivenessConfig;
use secchiware_core::Timestamp;

use crate::environments;
use crate::server::ServerState;
use crate::telemetry::C2Operation;

// ============================================================================
// SECTION: Sweep Loop
// ============================================================================

/// Runs sweep rounds forever at the configured interval.
pub async fn run_sweeper(state: Arc<ServerState>, config: LivenessConfig) {
    let interval = Duration::from_secs(config.interval_secs);
    loop {
        tokio::time::sleep(interval).await;
        sweep_once(&state, &config).await;
    }
}

/// Probes every active entry once, retiring the dead.
pub async fn sweep_once(state: &ServerState, config: &LivenessConfig) {
    let Ok(keys) = state.broker.keys(environments::ACTIVE_PREFIX) else {
        return;
    };
    for key in keys {
        let Some(endpoint) = environments::endpoint_from_key(&key) else {
            continue;
        };
        if probe_with_backoff(state, &endpoint, config).await {
            continue;
        }
        retire(state, &endpoint).await;
    }
}

/// Probes one endpoint with exponential backoff between attempts.
async fn probe_with_backoff(
    state: &ServerState,
    endpoint: &secchiware_core::EnvironmentEndpoint,
    config: &LivenessConfig,
) -> bool {
    let timeout = Duration::from_millis(config.timeout_ms);
    for attempt in 0..config.attempts {
        if state.node_client.probe(endpoint, timeout).await.is_ok() {
            return true;
        }
        if attempt + 1 < config.attempts {
            tokio::time::sleep(Duration::from_secs(1_u64 << attempt.min(4))).await;
        }
    }
    false
}

/// Closes the session and removes the entry under the endpoint mutex.
async fn retire(state: &ServerState, endpoint: &secchiware_core::EnvironmentEndpoint) {
    let lock_name = environments::env_lock_name(endpoint);
    let Ok(Some(token)) = state.broker.acquire(&lock_name, state.lock_ttl) else {
        // Another worker holds the endpoint; it will finish the retirement.
        return;
    };
    let retired = match environments::active_entry(state, endpoint) {
        Ok(Some(entry)) => {
            let closed = state.store.close_session(entry.session_id, &Timestamp::now());
            let _ = state.broker.delete(&environments::active_key(endpoint));
            closed.is_ok()
        }
        _ => false,
    };
    let _ = state.broker.release(&lock_name, token);
    if retired {
        state.record(C2Operation::SweeperRetire, true);
    }
}
