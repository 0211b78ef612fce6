//! acms - an autonomous code-modification pipeline
//!
//! acms executes dependency-ordered, guardrail-checked modification runs
//! against a repository: a run orchestrator drives tasks through a
//! dependency-aware scheduler, a pattern-based guardrail layer enforces
//! what each task is allowed to touch, and a resilient tool-adapter layer
//! shells out to the underlying editing tools with retries and circuit
//! breakers. All state is append-only and recoverable from an embedded
//! store plus an event ledger.
//!
//! # Modules
//!
//! - [`domain`] - core entities: runs, workstreams, tasks, patches, patterns
//! - [`paths`] - symbolic path registry
//! - [`ledger`] - append-only event ledger
//! - [`tools`] - tool adapter: subprocess execution of tool profiles
//! - [`resilience`] - circuit breakers and retry policy around the adapter
//! - [`guardrails`] - pattern registry and pre/post execution checks
//! - [`worktree`] - git worktree isolation per workstream
//! - [`scheduler`] - dependency-aware task DAG scheduler
//! - [`router`] - operation-kind to tool-id routing
//! - [`patch`] - patch lifecycle ledger
//! - [`executor`] - single-task execution pipeline
//! - [`orchestrator`] - run state machine tying scheduler and executor together
//! - [`daemon`] - background process lifecycle and run supervisor
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod executor;
pub mod guardrails;
pub mod ledger;
pub mod orchestrator;
pub mod patch;
pub mod paths;
pub mod resilience;
pub mod router;
pub mod scheduler;
pub mod tools;
pub mod worktree;

pub use config::Config;
pub use daemon::{DaemonManager, DaemonStatus, RunSupervisor, SupervisorError};
pub use domain::{
    Event, Filter, FilterOp, GuardrailViolation, IndexValue, MaxChanges, Patch, PathScope, PatchStatus, PatchTransition,
    Pattern, Phase, PhaseTransition, Record, Run, RunMetrics, RunStatus, Session, SessionState, Severity, Store, Task,
    TaskKind, TaskStatus, ToolRunRequest, ToolRunResult, Workstream,
};
pub use executor::{Executor, ExecutorConfig, TaskOutcome};
pub use guardrails::{PatternRegistry, PatternRegistryError};
pub use ledger::EventLedger;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
pub use patch::{is_allowed_transition, PatchLedger, PatchLedgerError};
pub use paths::{PathError, PathRegistry};
pub use resilience::{CircuitBreaker, CircuitState, ResilientAdapter, RetryPolicy};
pub use router::{RoundRobinCounter, RouteRule, Router, RouterConfig, Strategy};
pub use scheduler::{Scheduler, SchedulerError};
pub use tools::{run_tool, ToolProfile, ToolRequestBuilder};
pub use worktree::{WorktreeConfig, WorktreeError, WorktreeInfo, WorktreeManager};
