//! Execution layer: resilience primitives and the orchestrator that
//! composes them with the transport and the cache.

mod circuit_breaker;
mod orchestrator;
mod throttle;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use orchestrator::RequestOrchestrator;
pub use throttle::{KeyedThrottle, DEFAULT_MIN_INTERVAL};
