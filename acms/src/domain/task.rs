//! Task: a unit of executable work routed to a tool

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statestore::{now_ms, IndexValue, Record};

use super::tool::ToolRunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Analysis,
    Implementation,
    Test,
    Refactor,
    Other,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskKind::Analysis => "analysis",
            TaskKind::Implementation => "implementation",
            TaskKind::Test => "test",
            TaskKind::Refactor => "refactor",
            TaskKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Mutable execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Blocked,
    Skipped,
}

impl TaskStatus {
    /// Blocked, skipped, failed and succeeded are all terminal for the run —
    /// a blocked task is never retried within this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Blocked | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workstream_id: String,
    pub kind: TaskKind,
    pub depends_on: Vec<String>,
    pub pattern_id: String,
    pub operation_kind: String,
    pub routing_hints: serde_json::Value,
    pub file_scope: Vec<String>,
    pub metadata: serde_json::Value,
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub last_tool_run: Option<ToolRunResult>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn new(id: impl Into<String>, workstream_id: impl Into<String>, kind: TaskKind, pattern_id: impl Into<String>, operation_kind: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            workstream_id: workstream_id.into(),
            kind,
            depends_on: Vec::new(),
            pattern_id: pattern_id.into(),
            operation_kind: operation_kind.into(),
            routing_hints: serde_json::Value::Null,
            file_scope: Vec::new(),
            metadata: serde_json::Value::Null,
            status: TaskStatus::Pending,
            attempt_count: 0,
            last_tool_run: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn record_attempt(&mut self, result: ToolRunResult) {
        self.attempt_count += 1;
        self.last_tool_run = Some(result);
        self.updated_at = now_ms();
    }

    /// A task is ready iff it is pending and all of its declared
    /// dependencies are in `succeeded`.
    pub fn is_ready(&self, succeeded: &std::collections::HashSet<String>) -> bool {
        self.status == TaskStatus::Pending && self.depends_on.iter().all(|d| succeeded.contains(d))
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("workstream_id".to_string(), IndexValue::String(self.workstream_id.clone()));
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("pattern_id".to_string(), IndexValue::String(self.pattern_id.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn task(id: &str) -> Task {
        Task::new(id, "ws-1", TaskKind::Implementation, "noop_ok", "edit")
    }

    #[test]
    fn pending_with_no_deps_is_ready() {
        let t = task("a");
        assert!(t.is_ready(&HashSet::new()));
    }

    #[test]
    fn pending_with_unmet_dep_is_not_ready() {
        let mut t = task("b");
        t.depends_on.push("a".to_string());
        assert!(!t.is_ready(&HashSet::new()));
        let mut succeeded = HashSet::new();
        succeeded.insert("a".to_string());
        assert!(t.is_ready(&succeeded));
    }

    #[test]
    fn non_pending_is_never_ready() {
        let mut t = task("a");
        t.set_status(TaskStatus::Running);
        assert!(!t.is_ready(&HashSet::new()));
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Blocked.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Ready.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
