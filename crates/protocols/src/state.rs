//! Per-neighbour outgoing-connection guard.
//!
//! Discovery signals for one neighbour can arrive from several tasks at
//! once. Each protocol keeps one [`ConnectionState`] per neighbour
//! address; only the first `begin_outgoing` wins, every later one fails
//! until the attempt ends. The losing callers drop their attempt — that
//! is the expected path, not an error condition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors raised by the connection state machine.
#[derive(Debug, Error)]
pub enum StateError {
    /// An outgoing attempt is already in flight for this address.
    /// Callers treat this as "drop the redundant attempt".
    #[error("outgoing attempt already in flight for {address} (worker {worker_id:?})")]
    AlreadyConnecting {
        /// Neighbour address of the in-flight attempt.
        address: String,
        /// Worker that owns the in-flight attempt, when recorded.
        worker_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting { worker_id: String },
}

/// Connection phase of one (protocol, neighbour address) pair.
///
/// A connected neighbour is not tracked here; it is visible through the
/// presence of its worker in the pool.
#[derive(Debug)]
pub struct ConnectionState {
    phase: Mutex<Phase>,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Atomically claim the outgoing attempt for this address.
    pub fn begin_outgoing(&self, address: &str, worker_id: &str) -> Result<(), StateError> {
        let mut phase = self.phase.lock().unwrap();
        match &*phase {
            Phase::Idle => {
                *phase = Phase::Connecting {
                    worker_id: worker_id.to_string(),
                };
                Ok(())
            }
            Phase::Connecting { worker_id } => Err(StateError::AlreadyConnecting {
                address: address.to_string(),
                worker_id: Some(worker_id.clone()),
            }),
        }
    }

    /// Reset to idle. Idempotent; safe when no attempt was recorded.
    pub fn end(&self) {
        *self.phase.lock().unwrap() = Phase::Idle;
    }

    /// Whether an outgoing attempt is currently in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(&*self.phase.lock().unwrap(), Phase::Connecting { .. })
    }

    /// Worker that owns the in-flight attempt, if any.
    pub fn connecting_worker(&self) -> Option<String> {
        match &*self.phase.lock().unwrap() {
            Phase::Connecting { worker_id } => Some(worker_id.clone()),
            Phase::Idle => None,
        }
    }
}

/// Lazily-built map of neighbour address to [`ConnectionState`].
///
/// The lookup-or-insert runs inside a single critical section, so
/// concurrent first touches of one address all observe the same state
/// object — exactly one object per address ever exists.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    states: Mutex<HashMap<String, Arc<ConnectionState>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the shared state for `address`.
    pub fn state_for(&self, address: &str) -> Arc<ConnectionState> {
        let mut states = self.states.lock().unwrap();
        states
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(ConnectionState::new()))
            .clone()
    }

    /// Claim the outgoing attempt for `address`.
    pub fn begin_outgoing(&self, address: &str, worker_id: &str) -> Result<(), StateError> {
        self.state_for(address).begin_outgoing(address, worker_id)
    }

    /// Reset the attempt for `address` if it is tracked. Does not
    /// create state for untracked addresses.
    pub fn end(&self, address: &str) {
        let state = self.states.lock().unwrap().get(address).cloned();
        if let Some(state) = state {
            state.end();
        }
    }

    /// Reset every tracked address and drop the map. Used on protocol
    /// shutdown.
    pub fn clear_all(&self) {
        let drained: Vec<Arc<ConnectionState>> = {
            let mut states = self.states.lock().unwrap();
            let drained = states.values().cloned().collect();
            states.clear();
            drained
        };
        // Workers holding one of these state handles see it reset even
        // though the map entry is gone.
        for state in drained {
            state.end();
        }
    }

    /// Number of tracked addresses.
    pub fn len(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
