// crates/secchiware-broker/src/memory.rs
// ============================================================================
// Module: In-Memory Broker
// Description: Mutex-guarded key-value store with TTLs and fencing mutexes.
// Purpose: Satisfy the CacheBroker contract inside one process.
// Dependencies: secchiware-core, serde_json
// ============================================================================

//! ## Overview
//! [`MemoryBroker`] keeps three tables behind one mutex: JSON values with
//! optional TTLs, replay counters with mandatory TTLs, and named mutexes with
//! fencing tokens. Every operation purges expired state for the touched key
//! before acting, so expiry is observable without a background reaper.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use secchiware_core::BrokerError;
use secchiware_core::CacheBroker;
use secchiware_core::FencingToken;
use serde_json::Value;

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Stored JSON value with an optional expiry deadline.
#[derive(Debug, Clone)]
struct ValueEntry {
    /// Stored value.
    value: Value,
    /// Expiry deadline; `None` means the value never expires.
    expires_at: Option<Instant>,
}

impl ValueEntry {
    /// Returns true when the entry is past its deadline.
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Stored counter with a mandatory expiry deadline.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    /// Current counter value.
    count: u64,
    /// Expiry deadline.
    expires_at: Instant,
}

/// Named mutex bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
struct MutexEntry {
    /// Last issued fencing token value.
    last_token: u64,
    /// Current holder token and lease deadline, when held.
    held: Option<(u64, Instant)>,
}

/// Broker tables guarded by the outer mutex.
#[derive(Debug, Default)]
struct BrokerState {
    /// JSON values keyed by string.
    values: BTreeMap<String, ValueEntry>,
    /// Replay counters keyed by string.
    counters: BTreeMap<String, CounterEntry>,
    /// Named mutexes keyed by name.
    mutexes: BTreeMap<String, MutexEntry>,
}

// ============================================================================
// SECTION: Memory Broker
// ============================================================================

/// In-process cache/lock broker.
///
/// # Invariants
/// - All tables share one mutex; operations are linearizable.
/// - Fencing tokens increase monotonically per mutex name, across expiries.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    /// Guarded broker tables.
    state: Mutex<BrokerState>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, mapping poisoning to a backend error.
    fn locked(&self) -> Result<std::sync::MutexGuard<'_, BrokerState>, BrokerError> {
        self.state.lock().map_err(|_| BrokerError::Backend("broker mutex poisoned".to_string()))
    }
}

impl CacheBroker for MemoryBroker {
    fn get(&self, key: &str) -> Result<Option<Value>, BrokerError> {
        let now = Instant::now();
        let mut state = self.locked()?;
        if let Some(entry) = state.values.get(key) {
            if entry.expired(now) {
                state.values.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), BrokerError> {
        let now = Instant::now();
        let mut state = self.locked()?;
        state.values.insert(
            key.to_string(),
            ValueEntry {
                value,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, BrokerError> {
        let now = Instant::now();
        let mut state = self.locked()?;
        match state.values.remove(key) {
            Some(entry) => Ok(!entry.expired(now)),
            None => Ok(false),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, BrokerError> {
        let now = Instant::now();
        let mut state = self.locked()?;
        state.values.retain(|_, entry| !entry.expired(now));
        Ok(state.values.keys().filter(|key| key.starts_with(prefix)).cloned().collect())
    }

    fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<FencingToken>, BrokerError> {
        let now = Instant::now();
        let mut state = self.locked()?;
        let entry = state.mutexes.entry(name.to_string()).or_default();
        if let Some((_, deadline)) = entry.held
            && deadline > now
        {
            return Ok(None);
        }
        entry.last_token += 1;
        entry.held = Some((entry.last_token, now + ttl));
        Ok(Some(FencingToken::new(entry.last_token)))
    }

    fn release(&self, name: &str, token: FencingToken) -> Result<bool, BrokerError> {
        let mut state = self.locked()?;
        let Some(entry) = state.mutexes.get_mut(name) else {
            return Ok(false);
        };
        match entry.held {
            Some((current, _)) if current == token.get() => {
                entry.held = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn incr(&self, key: &str, ttl: Duration) -> Result<u64, BrokerError> {
        let now = Instant::now();
        let mut state = self.locked()?;
        let counter = state.counters.get(key).copied();
        let next = match counter {
            Some(entry) if entry.expires_at > now => CounterEntry {
                count: entry.count + 1,
                expires_at: entry.expires_at,
            },
            _ => CounterEntry {
                count: 1,
                expires_at: now + ttl,
            },
        };
        state.counters.insert(key.to_string(), next);
        Ok(next.count)
    }
}
