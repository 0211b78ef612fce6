use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use statestore::Store;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Event, Phase, PhaseTransition, Run, RunStatus, Task, TaskStatus};
use crate::executor::Executor;
use crate::ledger::EventLedger;
use crate::scheduler::{Scheduler, SchedulerError};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_tasks: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_concurrent_tasks: 4 }
    }
}

/// Orchestrator-fatal failures: the narrow set of conditions spec.md §4.12
/// says must abort the run rather than degrade gracefully.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("protected-path violation on task {task_id}")]
    ProtectedPathViolation { task_id: String },

    #[error("scheduler cycle: {0}")]
    SchedulerCycle(String),

    #[error("state store I/O error: {0}")]
    StoreIo(String),

    #[error("unrecoverable resilience failure for tool {tool_id} on task {task_id}")]
    ResilienceUnrecoverable { task_id: String, tool_id: String },
}

pub struct Orchestrator<'a> {
    store: &'a Store,
    ledger_path: PathBuf,
    run_status_path: PathBuf,
    config: OrchestratorConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(store: &'a Store, ledger_path: impl Into<PathBuf>, run_status_path: impl Into<PathBuf>, config: OrchestratorConfig) -> Self {
        Self { store, ledger_path: ledger_path.into(), run_status_path: run_status_path.into(), config }
    }

    /// Drives `run` from `init` to a terminal phase. `tasks` is the
    /// validated execution plan's task set, already persisted by planning.
    pub async fn run(
        &self,
        run: &mut Run,
        mut tasks: HashMap<String, Task>,
        executor: &Executor<'_>,
        cwd: &str,
        cancel: &AtomicBool,
    ) -> Result<RunStatus, OrchestratorError> {
        let mut phase_transitions = Vec::new();

        self.transition(run, Phase::GapAnalysis, &mut phase_transitions);
        self.transition(run, Phase::Planning, &mut phase_transitions);
        self.transition(run, Phase::Execution, &mut phase_transitions);
        self.persist_run(run)?;

        let result = self.execute_phase(run, &mut tasks, executor, cwd, cancel).await;

        let final_phase = match &result {
            Ok(()) if run.cancellation_requested => Phase::Failed,
            Ok(()) => Phase::Done,
            Err(_) => Phase::Failed,
        };

        self.transition(run, Phase::Summary, &mut phase_transitions);
        self.transition(run, final_phase, &mut phase_transitions);
        self.persist_run(run)?;

        let artifacts = vec![self.ledger_path.display().to_string()];
        let status = RunStatus::from_run(run, phase_transitions, artifacts);
        write_atomic(&self.run_status_path, &status).map_err(|e| OrchestratorError::StoreIo(e.to_string()))?;

        if let Err(err) = result {
            return Err(err);
        }

        Ok(status)
    }

    async fn execute_phase(
        &self,
        run: &mut Run,
        tasks: &mut HashMap<String, Task>,
        executor: &Executor<'_>,
        cwd: &str,
        cancel: &AtomicBool,
    ) -> Result<(), OrchestratorError> {
        let dag: Vec<(String, Vec<String>)> = tasks.values().map(|t| (t.id.clone(), t.depends_on.clone())).collect();
        let scheduler = Scheduler::new(dag).map_err(|e: SchedulerError| OrchestratorError::SchedulerCycle(e.to_string()))?;
        let run_id = run.id.clone();

        loop {
            if scheduler.is_complete().await {
                break;
            }
            if cancel.load(Ordering::SeqCst) {
                info!(run_id = %run_id, "cancellation observed between scheduler batches");
                run.request_cancellation();
                break;
            }

            let batch = scheduler.parallel_batches(self.config.max_concurrent_tasks).await;
            if batch.is_empty() {
                // Remaining tasks are unreachable: their dependencies include a
                // blocked task and will never be promoted to ready.
                warn!(run_id = %run_id, "no ready tasks and scheduler not complete; remaining tasks are stuck");
                break;
            }

            for task_id in &batch {
                let _ = scheduler.mark_task(task_id, TaskStatus::Running).await;
            }

            let futures: Vec<_> = batch
                .iter()
                .filter_map(|task_id| tasks.remove(task_id))
                .map(|mut task| {
                    let run_id = run_id.clone();
                    async move {
                        let outcome = executor.execute_task(&run_id, &mut task, cwd).await;
                        (task, outcome)
                    }
                })
                .collect();

            let results = futures::future::join_all(futures).await;

            for (task, outcome) in results {
                run.metrics.tasks_executed += 1;
                match outcome.status {
                    TaskStatus::Succeeded => {
                        let _ = scheduler.mark_task(&task.id, TaskStatus::Succeeded).await;
                    }
                    TaskStatus::Failed => {
                        run.metrics.tasks_failed += 1;
                        let _ = scheduler.mark_task(&task.id, TaskStatus::Failed).await;
                    }
                    TaskStatus::Blocked => {
                        run.metrics.tasks_failed += 1;
                        let _ = scheduler.mark_task(&task.id, TaskStatus::Blocked).await;
                    }
                    other => {
                        let _ = scheduler.mark_task(&task.id, other).await;
                    }
                }

                if outcome.violations.iter().any(|v| v.rule_id == "protected_path" && v.is_fatal()) {
                    return Err(OrchestratorError::ProtectedPathViolation { task_id: task.id.clone() });
                }
                if let Some(result) = &outcome.tool_result {
                    if outcome.status == TaskStatus::Failed && result.stderr.starts_with("circuit open") {
                        return Err(OrchestratorError::ResilienceUnrecoverable { task_id: task.id.clone(), tool_id: result.tool_id.clone() });
                    }
                }

                tasks.insert(task.id.clone(), task);
            }
        }

        Ok(())
    }

    /// Writes `exit_state(prev)` then `enter_state(new)` and advances the
    /// run in memory. Persistence happens at the caller's checkpoints, not
    /// on every transition, to keep the event ledger the single source of
    /// truth for the transition sequence.
    fn transition(&self, run: &mut Run, to: Phase, history: &mut Vec<PhaseTransition>) {
        let prev = run.phase;
        EventLedger::append(&self.ledger_path, &Event::exit_state(run.id.as_str(), prev));
        run.transition(to);
        EventLedger::append(&self.ledger_path, &Event::enter_state(run.id.as_str(), to));
        history.push(PhaseTransition { phase: to, at: run.updated_at });
    }

    fn persist_run(&self, run: &Run) -> Result<(), OrchestratorError> {
        self.store.update(run).map_err(|e| OrchestratorError::StoreIo(e.to_string()))
    }
}

fn write_atomic(path: &Path, status: &RunStatus) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let body = serde_json::to_vec_pretty(status)?;
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKind;
    use crate::executor::ExecutorConfig;
    use crate::guardrails::PatternRegistry;
    use crate::resilience::{ResilientAdapter, RetryPolicy};
    use crate::router::{RouteRule, Router, RouterConfig, Strategy};
    use crate::tools::ToolProfile;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    const PATTERN_YAML: &str = r#"
protected_paths: []
noop_ok:
  allowed_tools: [echo_tool]
  path_scope: {}
"#;

    #[tokio::test]
    async fn chain_of_two_tasks_runs_to_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("store.sqlite")).unwrap();
        let patterns = PatternRegistry::from_yaml(PATTERN_YAML).unwrap();
        let adapter = ResilientAdapter::new(RetryPolicy::new(0, Duration::from_millis(1)), 3, Duration::from_secs(30));
        let mut profiles = HashMap::new();
        profiles.insert(
            "echo_tool".to_string(),
            ToolProfile { command_template: vec!["echo".to_string(), "ok".to_string()], env: HashMap::new(), default_timeout_seconds: 5, placeholders: HashMap::new() },
        );
        let mut router = Router::new(
            RouterConfig { rules: vec![RouteRule { operation_kind: "edit".to_string(), strategy: Strategy::Fixed { tool_id: "echo_tool".to_string() } }] },
            crate::router::RoundRobinCounter::load(dir.path().join("counters.json")),
        );
        let ledger_path = dir.path().join("run.ledger.jsonl");
        let executor = Executor::new(&store, &patterns, &adapter, &profiles, &mut router, &ledger_path, ExecutorConfig::default());

        let mut task_a = Task::new("a", "ws-1", TaskKind::Implementation, "noop_ok", "edit");
        let mut task_b = Task::new("b", "ws-1", TaskKind::Implementation, "noop_ok", "edit");
        task_b.depends_on.push("a".to_string());
        store.create(&task_a).unwrap();
        store.create(&task_b).unwrap();

        let mut tasks = HashMap::new();
        tasks.insert(task_a.id.clone(), task_a);
        tasks.insert(task_b.id.clone(), task_b);

        let mut run = Run::new(dir.path().to_str().unwrap(), serde_json::json!({}));
        let run_status_path = dir.path().join("run_status.json");
        let orchestrator = Orchestrator::new(&store, &ledger_path, &run_status_path, OrchestratorConfig::default());
        let cancel = AtomicBool::new(false);

        let status = orchestrator.run(&mut run, tasks, &executor, dir.path().to_str().unwrap(), &cancel).await.unwrap();
        assert_eq!(status.final_status, Phase::Done);
        assert_eq!(status.metrics.tasks_executed, 2);
        assert!(run_status_path.exists());
    }

    #[tokio::test]
    async fn cycle_in_plan_is_orchestrator_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("store.sqlite")).unwrap();
        let patterns = PatternRegistry::from_yaml(PATTERN_YAML).unwrap();
        let adapter = ResilientAdapter::new(RetryPolicy::new(0, Duration::from_millis(1)), 3, Duration::from_secs(30));
        let profiles = HashMap::new();
        let mut router = Router::new(RouterConfig { rules: vec![] }, crate::router::RoundRobinCounter::load(dir.path().join("counters.json")));
        let ledger_path = dir.path().join("run.ledger.jsonl");
        let executor = Executor::new(&store, &patterns, &adapter, &profiles, &mut router, &ledger_path, ExecutorConfig::default());

        let mut task_a = Task::new("a", "ws-1", TaskKind::Implementation, "noop_ok", "edit");
        let mut task_b = Task::new("b", "ws-1", TaskKind::Implementation, "noop_ok", "edit");
        task_a.depends_on.push("b".to_string());
        task_b.depends_on.push("a".to_string());
        let mut tasks = HashMap::new();
        tasks.insert(task_a.id.clone(), task_a);
        tasks.insert(task_b.id.clone(), task_b);

        let mut run = Run::new(dir.path().to_str().unwrap(), serde_json::json!({}));
        let run_status_path = dir.path().join("run_status.json");
        let orchestrator = Orchestrator::new(&store, &ledger_path, &run_status_path, OrchestratorConfig::default());
        let cancel = AtomicBool::new(false);

        let err = orchestrator.run(&mut run, tasks, &executor, dir.path().to_str().unwrap(), &cancel).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SchedulerCycle(_)));
        assert_eq!(run.phase, Phase::Failed);
    }
}
