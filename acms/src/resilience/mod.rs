//! Resilience Layer: wraps `run_tool` per tool id with a circuit breaker
//! and a retry policy. Like the adapter it wraps, it never raises.

mod breaker;
mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{ToolRunRequest, ToolRunResult, EXIT_RUNTIME_ERROR};
use crate::tools::run_tool;

/// Per-tool circuit breakers plus a shared retry policy, the only
/// per-process mutable singleton this layer owns.
pub struct ResilientAdapter {
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    retry: RetryPolicy,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl ResilientAdapter {
    pub fn new(retry: RetryPolicy, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            retry,
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Run `request` through the circuit breaker and retry policy for its
    /// tool id. Retries only timeouts and runtime errors; never retries a
    /// result with committed side effects or a guardrail violation (those
    /// never reach this layer).
    pub async fn run(&self, request: &ToolRunRequest) -> ToolRunResult {
        if self.is_open(&request.tool_id) {
            warn!(tool_id = %request.tool_id, "circuit open, short-circuiting");
            return open_circuit_result(request);
        }

        let mut attempt = 0u32;
        loop {
            let result = run_tool(request).await;
            self.record_outcome(&request.tool_id, result.succeeded());

            if result.succeeded() || !result.is_retryable_failure() || attempt >= self.retry.max_attempts {
                return result;
            }

            let delay = self.retry.backoff(attempt);
            info!(tool_id = %request.tool_id, attempt, delay_ms = delay.as_millis() as u64, "retrying tool run");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn is_open(&self, tool_id: &str) -> bool {
        let mut breakers = self.breakers.lock().expect("breaker mutex poisoned");
        let breaker = breakers
            .entry(tool_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.recovery_timeout));
        !breaker.allow_call()
    }

    fn record_outcome(&self, tool_id: &str, success: bool) {
        let mut breakers = self.breakers.lock().expect("breaker mutex poisoned");
        let breaker = breakers
            .entry(tool_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.recovery_timeout));
        if success {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
    }

    pub fn state_of(&self, tool_id: &str) -> CircuitState {
        let breakers = self.breakers.lock().expect("breaker mutex poisoned");
        breakers.get(tool_id).map(|b| b.state()).unwrap_or(CircuitState::Closed)
    }
}

fn open_circuit_result(request: &ToolRunRequest) -> ToolRunResult {
    ToolRunResult {
        tool_id: request.tool_id.clone(),
        exit_code: EXIT_RUNTIME_ERROR,
        stdout: String::new(),
        stderr: format!("circuit open for tool {}", request.tool_id),
        duration_ms: 0,
        timed_out: false,
        started_at: 0,
        ended_at: 0,
    }
}
