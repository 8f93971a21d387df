//! Health Monitor and Circuit Breaker (spec §4.3, §4.4).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod circuit_breaker;
pub mod health_monitor;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use health_monitor::{HealthCallback, HealthMonitor, HealthMonitorConfig};
