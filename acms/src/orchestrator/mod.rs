//! Orchestrator: the run state machine. Drives a run from `init` through
//! `gap_analysis`/`planning` (external components), `execution` (scheduler
//! + executor worker pool), to `summary` and a terminal `done`/`failed`.

mod run_loop;

pub use run_loop::{Orchestrator, OrchestratorConfig, OrchestratorError};
