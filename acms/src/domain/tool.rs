//! Tool run request/result: the contract at the tool-adapter boundary.
//!
//! Adapters never raise across this boundary — every failure mode encodes
//! into a reserved negative exit code and populated stderr.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const EXIT_TIMEOUT: i32 = -1;
pub const EXIT_BINARY_NOT_FOUND: i32 = -2;
pub const EXIT_RUNTIME_ERROR: i32 = -3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRunRequest {
    pub tool_id: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub timeout_seconds: u64,
    pub stdin: Option<String>,
    pub log_context: serde_json::Value,
}

impl ToolRunRequest {
    pub fn new(tool_id: impl Into<String>, args: Vec<String>, cwd: impl Into<String>, timeout_seconds: u64) -> Self {
        Self {
            tool_id: tool_id.into(),
            args,
            cwd: cwd.into(),
            env: HashMap::new(),
            timeout_seconds,
            stdin: None,
            log_context: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRunResult {
    pub tool_id: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub started_at: i64,
    pub ended_at: i64,
}

impl ToolRunResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Whether this failure kind is safe to retry: timeout or an
    /// unclassified runtime error. A non-deterministic failure, in the
    /// resilience layer's terms.
    pub fn is_retryable_failure(&self) -> bool {
        self.timed_out || self.exit_code == EXIT_TIMEOUT || self.exit_code == EXIT_RUNTIME_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32, timed_out: bool) -> ToolRunResult {
        ToolRunResult {
            tool_id: "editor".to_string(),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 10,
            timed_out,
            started_at: 0,
            ended_at: 10,
        }
    }

    #[test]
    fn zero_exit_is_success() {
        assert!(result(0, false).succeeded());
    }

    #[test]
    fn runtime_error_and_timeout_are_retryable() {
        assert!(result(EXIT_RUNTIME_ERROR, false).is_retryable_failure());
        assert!(result(EXIT_TIMEOUT, true).is_retryable_failure());
    }

    #[test]
    fn missing_binary_is_not_retryable() {
        assert!(!result(EXIT_BINARY_NOT_FOUND, false).is_retryable_failure());
    }
}
