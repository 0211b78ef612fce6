//! Run and Phase: the top-level unit of work and its state machine

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statestore::{now_ms, IndexValue, Record};

use super::id::generate_id;

/// The run's position in its state machine. Any phase may transition to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Init,
    GapAnalysis,
    Planning,
    Execution,
    Summary,
    Done,
    Failed,
}

impl Phase {
    /// Whether this phase is terminal for the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::GapAnalysis => write!(f, "gap_analysis"),
            Phase::Planning => write!(f, "planning"),
            Phase::Execution => write!(f, "execution"),
            Phase::Summary => write!(f, "summary"),
            Phase::Done => write!(f, "done"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

/// Aggregate counters updated as the run progresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub gaps_discovered: u32,
    pub workstreams_created: u32,
    pub tasks_executed: u32,
    pub tasks_failed: u32,
}

/// One end-to-end invocation of the pipeline against a repository.
///
/// Created at orchestrator entry, mutated only by the orchestrator's
/// state-transition operation, terminal when `phase` is `Done` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub repo_root: String,
    pub config_snapshot: serde_json::Value,
    pub phase: Phase,
    pub metrics: RunMetrics,
    pub cancellation_requested: bool,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub final_status: Option<Phase>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Run {
    /// Start a new run. Id is time-sortable (uuid v7 derived).
    pub fn new(repo_root: impl Into<String>, config_snapshot: serde_json::Value) -> Self {
        let repo_root = repo_root.into();
        let now = now_ms();
        Self {
            id: generate_id("run", &repo_root_slug(&repo_root)),
            repo_root,
            config_snapshot,
            phase: Phase::Init,
            metrics: RunMetrics::default(),
            cancellation_requested: false,
            started_at: now,
            completed_at: None,
            final_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, phase: Phase) {
        self.phase = phase;
        self.updated_at = now_ms();
        if phase.is_terminal() {
            self.completed_at = Some(self.updated_at);
            self.final_status = Some(phase);
        }
    }

    pub fn request_cancellation(&mut self) {
        self.cancellation_requested = true;
        self.updated_at = now_ms();
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

fn repo_root_slug(repo_root: &str) -> String {
    repo_root
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("repo")
        .to_string()
}

impl Record for Run {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "runs"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("phase".to_string(), IndexValue::String(self.phase.to_string()));
        fields.insert("repo_root".to_string(), IndexValue::String(self.repo_root.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_in_init() {
        let run = Run::new("/repo/acme", serde_json::json!({}));
        assert_eq!(run.phase, Phase::Init);
        assert!(!run.is_terminal());
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn transition_to_done_sets_completed_at() {
        let mut run = Run::new("/repo/acme", serde_json::json!({}));
        run.transition(Phase::Done);
        assert!(run.is_terminal());
        assert!(run.completed_at.is_some());
        assert_eq!(run.final_status, Some(Phase::Done));
    }

    #[test]
    fn cancellation_flag_is_sticky() {
        let mut run = Run::new("/repo/acme", serde_json::json!({}));
        run.request_cancellation();
        assert!(run.cancellation_requested);
    }
}
