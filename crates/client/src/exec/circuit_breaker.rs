//! Per-tenant circuit breaker for cascading-failure protection.
//!
//! Implements the circuit breaker pattern so a persistently unhealthy
//! vendor endpoint fails fast instead of tying up callers. The circuit
//! has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Endpoint is failing, requests are rejected immediately.
//! - **HalfOpen**: Probing whether the endpoint has recovered.
//!
//! One circuit exists per tenant key, so a failing account cannot starve
//! another sharing the process. Circuits are in-memory and reset on
//! application restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::errors::AdapterError;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of probe calls admitted while HalfOpen.
const DEFAULT_HALF_OPEN_PROBE_BUDGET: u32 = 3;

/// Successful probes needed to close the circuit from HalfOpen.
const DEFAULT_HALF_OPEN_SUCCESSES_NEEDED: u32 = 3;

/// Idle circuits (Closed, zero failures) are swept after this long.
const IDLE_SWEEP_AFTER: Duration = Duration::from_secs(3_600);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Endpoint is failing - requests are rejected.
    Open,
    /// Probing recovery - a bounded number of requests allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Internal circuit state for a single tenant.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Consecutive failures while Closed.
    consecutive_failures: u32,
    /// Successful probes while HalfOpen.
    half_open_successes: u32,
    /// Probes admitted during the current HalfOpen phase.
    half_open_admitted: u32,
    /// Time of the last failure (drives the reset timeout).
    last_failure: Option<Instant>,
    /// Last admit/record touch, for idle sweeping.
    last_activity: Instant,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_admitted: 0,
            last_failure: None,
            last_activity: Instant::now(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait before probing recovery.
    pub reset_timeout: Duration,
    /// Maximum probes admitted while HalfOpen.
    pub half_open_probe_budget: u32,
    /// Successes needed to close from HalfOpen.
    pub half_open_successes_needed: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            half_open_probe_budget: DEFAULT_HALF_OPEN_PROBE_BUDGET,
            half_open_successes_needed: DEFAULT_HALF_OPEN_SUCCESSES_NEEDED,
        }
    }
}

/// Per-tenant circuit breaker registry.
///
/// Thread-safe; all state transitions happen under one mutex so the
/// HalfOpen counters cannot be torn by concurrent probes.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a circuit breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    ///
    /// Worst case after recovery is slightly incorrect circuit state,
    /// which beats panicking.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Ask the breaker to admit a call for `tenant`.
    ///
    /// Returns `Err(CircuitOpen)` without any network attempt when the
    /// circuit is Open (and the reset timeout has not elapsed) or when
    /// the HalfOpen probe budget is exhausted. Handles the transitions:
    ///
    /// - Open -> HalfOpen once the reset timeout elapses (the admitting
    ///   call becomes the first probe)
    /// - HalfOpen -> Open when the probe budget runs out before the
    ///   circuit managed to close
    pub fn check_admit(&self, tenant: &str) -> Result<(), AdapterError> {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(tenant.to_string()).or_insert_with(Circuit::new);
        circuit.last_activity = Instant::now();

        match circuit.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = circuit
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed > self.config.reset_timeout {
                    info!("Circuit breaker: '{tenant}' Open -> HalfOpen, admitting probe");
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_successes = 0;
                    circuit.half_open_admitted = 1;
                    Ok(())
                } else {
                    Err(AdapterError::CircuitOpen {
                        tenant: tenant.to_string(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if circuit.half_open_admitted < self.config.half_open_probe_budget {
                    circuit.half_open_admitted += 1;
                    debug!(
                        "Circuit breaker: '{tenant}' HalfOpen probe {}/{}",
                        circuit.half_open_admitted, self.config.half_open_probe_budget
                    );
                    Ok(())
                } else {
                    // Budget spent without closing: back to Open with a
                    // fresh cooldown.
                    info!("Circuit breaker: '{tenant}' probe budget exhausted, reopening");
                    circuit.state = CircuitState::Open;
                    circuit.last_failure = Some(Instant::now());
                    Err(AdapterError::CircuitOpen {
                        tenant: tenant.to_string(),
                    })
                }
            }
        }
    }

    /// Record a successful call for `tenant`.
    pub fn record_success(&self, tenant: &str) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(tenant.to_string()).or_insert_with(Circuit::new);
        circuit.last_activity = Instant::now();

        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                debug!(
                    "Circuit breaker: '{tenant}' HalfOpen success {}/{}",
                    circuit.half_open_successes, self.config.half_open_successes_needed
                );
                if circuit.half_open_successes >= self.config.half_open_successes_needed {
                    info!(
                        "Circuit breaker: closing '{tenant}' after {} probe successes",
                        circuit.half_open_successes
                    );
                    circuit.state = CircuitState::Closed;
                    circuit.consecutive_failures = 0;
                    circuit.half_open_successes = 0;
                    circuit.half_open_admitted = 0;
                    circuit.last_failure = None;
                }
            }
            CircuitState::Open => {
                // A probe admitted before the reopen can still finish here.
                debug!("Circuit breaker: late success for '{tenant}' in Open state, ignored");
            }
        }
    }

    /// Record a failed call for `tenant`.
    ///
    /// Any failure while HalfOpen immediately reopens the circuit.
    pub fn record_failure(&self, tenant: &str) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(tenant.to_string()).or_insert_with(Circuit::new);
        circuit.last_activity = Instant::now();
        circuit.last_failure = Some(Instant::now());

        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening '{tenant}' after {} consecutive failures",
                        circuit.consecutive_failures
                    );
                    circuit.state = CircuitState::Open;
                } else {
                    debug!(
                        "Circuit breaker: failure for '{tenant}' ({}/{})",
                        circuit.consecutive_failures, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker: reopening '{tenant}' after HalfOpen failure");
                circuit.state = CircuitState::Open;
                circuit.half_open_successes = 0;
                circuit.half_open_admitted = 0;
            }
            CircuitState::Open => {
                debug!("Circuit breaker: additional failure for '{tenant}' (already open)");
            }
        }
    }

    /// Current state for a tenant (Closed when never seen).
    pub fn state(&self, tenant: &str) -> CircuitState {
        self.lock_circuits()
            .get(tenant)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Consecutive failure count for a tenant.
    pub fn failure_count(&self, tenant: &str) -> u32 {
        self.lock_circuits()
            .get(tenant)
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
    }

    /// Force a tenant's circuit back to Closed.
    pub fn reset(&self, tenant: &str) {
        let mut circuits = self.lock_circuits();
        if let Some(circuit) = circuits.get_mut(tenant) {
            info!("Circuit breaker: manually resetting '{tenant}'");
            *circuit = Circuit::new();
        }
    }

    /// Drop circuits that have been Closed with zero failures for over
    /// an hour. Keeps the registry bounded in long-lived processes with
    /// churning tenants.
    pub fn sweep_idle(&self) {
        let mut circuits = self.lock_circuits();
        let before = circuits.len();
        circuits.retain(|_, c| {
            !(c.state == CircuitState::Closed
                && c.consecutive_failures == 0
                && c.last_activity.elapsed() > IDLE_SWEEP_AFTER)
        });
        let swept = before - circuits.len();
        if swept > 0 {
            debug!("Circuit breaker: swept {swept} idle circuits");
        }
    }

    /// Number of tracked circuits.
    pub fn tracked_tenants(&self) -> usize {
        self.lock_circuits().len()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
