//! Linear retry/backoff for the execution service's engine-call path.
//!
//! Deliberately simple — `retry_backoff * attempt`, no exponential growth
//! or jitter: engine calls are local RPCs to a co-located matching engine,
//! not a remote service worth jittering against a thundering herd.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Retry `op` up to `config.max_attempts` times, sleeping
/// `config.backoff * attempt` between tries. Stops immediately on an error
/// that fails [`CoreError::is_retryable`]'s no-retry predicate.
pub fn retry_engine_call<T>(config: RetryConfig, mut op: impl FnMut() -> CoreResult<T>) -> CoreResult<T> {
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_attempts || !err.is_retryable() {
                    return Err(err);
                }
                thread::sleep(config.backoff * attempt);
            }
        }
    }
}
