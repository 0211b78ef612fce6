//! Guardrail violation: a structured record emitted by a pre- or post-check

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailViolation {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub task_id: String,
    pub pattern_id: String,
    pub offending_paths: Vec<String>,
    pub offending_tools: Vec<String>,
    pub offending_values: Vec<String>,
}

impl GuardrailViolation {
    pub fn new(rule_id: impl Into<String>, severity: Severity, message: impl Into<String>, task_id: impl Into<String>, pattern_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            task_id: task_id.into(),
            pattern_id: pattern_id.into(),
            offending_paths: Vec::new(),
            offending_tools: Vec::new(),
            offending_values: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.offending_paths.push(path.into());
        self
    }

    /// A fatal violation blocks (pre) or fails (post) the task, overriding
    /// any tool-claimed success.
    pub fn is_fatal(&self) -> bool {
        self.severity >= Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_and_fatal_are_fatal_warning_is_not() {
        let v = GuardrailViolation::new("protected_path", Severity::Error, "touches .git", "t1", "noop_ok");
        assert!(v.is_fatal());
        let w = GuardrailViolation::new("style", Severity::Warning, "nit", "t1", "noop_ok");
        assert!(!w.is_fatal());
    }
}
