//! Failure-isolation primitives shared by the execution service and the
//! integration layer: a three-state circuit breaker guarding engine calls,
//! the linear retry helper the execution service's engine-call path uses
//! before giving up, and the process-level shutdown machinery (signal-driven
//! kill switch, panic hook) demo binaries install around the whole pipeline.

pub mod circuit_breaker;
pub mod kill_switch;
pub mod panic;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use kill_switch::{KillSwitch, KillSwitchState};
pub use panic::install_panic_handler;
pub use retry::{retry_engine_call, RetryConfig};
