//! RunStatus: the final aggregated view of a run, written atomically

use serde::{Deserialize, Serialize};

use super::run::{Phase, Run, RunMetrics};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub phase: Phase,
    pub at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub repo_root: String,
    pub final_status: Phase,
    pub phase_transitions: Vec<PhaseTransition>,
    pub metrics: RunMetrics,
    pub artifacts: Vec<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl RunStatus {
    pub fn from_run(run: &Run, phase_transitions: Vec<PhaseTransition>, artifacts: Vec<String>) -> Self {
        Self {
            run_id: run.id.clone(),
            repo_root: run.repo_root.clone(),
            final_status: run.final_status.unwrap_or(run.phase),
            phase_transitions,
            metrics: run.metrics.clone(),
            artifacts,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}
