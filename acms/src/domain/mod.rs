//! Domain types for the execution engine.
//!
//! Run, Workstream, and Task form the transitive graph owned by a run;
//! Pattern is configuration, owned by nothing. All persisted types
//! implement `statestore::Record`.

mod event;
mod guardrail;
mod id;
mod patch;
mod pattern;
mod run;
mod run_status;
mod session;
mod task;
mod tool;
mod workstream;

pub use event::Event;
pub use guardrail::{GuardrailViolation, Severity};
pub use id::{generate_id, DomainId, IdResolver};
pub use patch::{Patch, PatchStatus, PatchTransition};
pub use pattern::{MaxChanges, Pattern, PathScope};
pub use run::{Phase, Run, RunMetrics};
pub use run_status::{PhaseTransition, RunStatus};
pub use session::{Session, SessionState};
pub use task::{Task, TaskKind, TaskStatus};
pub use tool::{ToolRunRequest, ToolRunResult, EXIT_BINARY_NOT_FOUND, EXIT_RUNTIME_ERROR, EXIT_TIMEOUT};
pub use workstream::Workstream;

// Re-export statestore types for convenience
pub use statestore::{Filter, FilterOp, IndexValue, Record, Store};
