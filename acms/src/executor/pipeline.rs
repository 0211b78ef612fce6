use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use statestore::Store;
use tracing::warn;

use crate::domain::{Event, GuardrailViolation, Task, TaskStatus, ToolRunResult};
use crate::guardrails::{PatternRegistry, PostcheckInput, PrecheckInput};
use crate::ledger::EventLedger;
use crate::resilience::ResilientAdapter;
use crate::router::Router;
use crate::tools::{ToolProfile, ToolRequestBuilder};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_concurrent_tasks: usize,
    /// When a task has no resolvable pattern: block it rather than proceed
    /// with only global guardrails.
    pub block_on_missing_pattern: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_concurrent_tasks: 4, block_on_missing_pattern: true }
    }
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    pub tool_result: Option<ToolRunResult>,
    pub violations: Vec<GuardrailViolation>,
}

/// Owns the collaborators a single task execution needs: pattern registry,
/// router, resilient tool adapter, tool profiles, and the state store +
/// event ledger it persists outcomes to.
pub struct Executor<'a> {
    store: &'a Store,
    patterns: &'a PatternRegistry,
    adapter: &'a ResilientAdapter,
    profiles: &'a HashMap<String, ToolProfile>,
    router: Mutex<&'a mut Router>,
    ledger_path: PathBuf,
    config: ExecutorConfig,
}

impl<'a> Executor<'a> {
    pub fn new(
        store: &'a Store,
        patterns: &'a PatternRegistry,
        adapter: &'a ResilientAdapter,
        profiles: &'a HashMap<String, ToolProfile>,
        router: &'a mut Router,
        ledger_path: impl Into<PathBuf>,
        config: ExecutorConfig,
    ) -> Self {
        Self { store, patterns, adapter, profiles, router: Mutex::new(router), ledger_path: ledger_path.into(), config }
    }

    /// Runs the full per-task pipeline described in the component design.
    /// Persists the task's final state and emits a `task_complete` event
    /// before returning.
    pub async fn execute_task(&self, run_id: &str, task: &mut Task, cwd: &str) -> TaskOutcome {
        task.set_status(TaskStatus::Running);
        let _ = self.store.update(task);

        if self.patterns.get(&task.pattern_id).is_none() {
            EventLedger::append(&self.ledger_path, &Event::new(run_id, "pattern_missing").with_meta("task_id", task.id.clone()));
            if self.config.block_on_missing_pattern {
                return self.finish(run_id, task, TaskStatus::Blocked, None, Vec::new());
            }
        }

        let Some(tool_id) = self.router.lock().expect("router mutex poisoned").route(&task.operation_kind) else {
            warn!(task_id = %task.id, operation_kind = %task.operation_kind, "no route for operation kind");
            let violation = GuardrailViolation::new(
                "unroutable_operation",
                crate::domain::Severity::Fatal,
                format!("no route for operation kind {}", task.operation_kind),
                task.id.clone(),
                task.pattern_id.clone(),
            );
            return self.finish(run_id, task, TaskStatus::Blocked, None, vec![violation]);
        };

        let pre_input = PrecheckInput {
            task_id: &task.id,
            file_scope: &task.file_scope,
            tools: std::slice::from_ref(&tool_id),
            operations: std::slice::from_ref(&task.operation_kind),
            context: &task.metadata,
        };
        let (pre_passed, mut violations) = self.patterns.pre_execution_check(&task.pattern_id, &pre_input);
        if !pre_passed {
            for violation in &violations {
                EventLedger::append(&self.ledger_path, &guardrail_violation_event(run_id, violation));
            }
            return self.finish(run_id, task, TaskStatus::Blocked, None, violations);
        }

        let Some(profile) = self.profiles.get(&tool_id) else {
            let violation = GuardrailViolation::new(
                "missing_tool_profile",
                crate::domain::Severity::Fatal,
                format!("no tool profile registered for {tool_id}"),
                task.id.clone(),
                task.pattern_id.clone(),
            );
            violations.push(violation.clone());
            return self.finish(run_id, task, TaskStatus::Failed, None, violations);
        };

        let request = ToolRequestBuilder::build(&tool_id, profile, task, cwd);
        EventLedger::append(&self.ledger_path, &Event::new(run_id, "tool_run_started").with_meta("task_id", task.id.clone()).with_meta("tool_id", tool_id.clone()));
        let result = self.adapter.run(&request).await;
        EventLedger::append(
            &self.ledger_path,
            &Event::new(run_id, "tool_run_finished")
                .with_meta("task_id", task.id.clone())
                .with_meta("exit_code", result.exit_code),
        );

        let claimed_success = result.succeeded();
        let verification = serde_json::json!({ "exit_code": result.exit_code, "timed_out": result.timed_out });
        let post_input = PostcheckInput {
            task_id: &task.id,
            changed_files: &task.file_scope,
            changed_lines: 0,
            changed_hunks: 0,
            expected_outputs: &[],
            claimed_success,
            verification: &verification,
        };
        let (post_passed, post_violations) = self.patterns.post_execution_check(&task.pattern_id, &post_input);
        for violation in &post_violations {
            if violation.rule_id == "AP_HALLUCINATED_SUCCESS" {
                EventLedger::append(
                    &self.ledger_path,
                    &Event::new(run_id, "anti_pattern")
                        .with_meta("task_id", task.id.clone())
                        .with_meta("rule_id", violation.rule_id.clone()),
                );
            }
        }
        violations.extend(post_violations);

        let status = if !post_passed {
            // hallucinated-success anti-pattern: the tool claimed success but
            // guardrails disagree -- status is overridden regardless of exit code.
            TaskStatus::Failed
        } else if claimed_success {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };

        self.finish(run_id, task, status, Some(result), violations)
    }

    fn finish(&self, run_id: &str, task: &mut Task, status: TaskStatus, result: Option<ToolRunResult>, violations: Vec<GuardrailViolation>) -> TaskOutcome {
        if let Some(result) = result.clone() {
            task.record_attempt(result);
        }
        task.set_status(status);
        if let Err(err) = self.store.update(task) {
            warn!(task_id = %task.id, ?err, "failed to persist task outcome");
        }

        let event = Event::new(run_id, "task_complete")
            .with_meta("task_id", task.id.clone())
            .with_meta("status", status.to_string())
            .with_meta("violation_count", violations.len() as i64);
        EventLedger::append(&self.ledger_path, &event);

        TaskOutcome { task_id: task.id.clone(), status, tool_result: result, violations }
    }
}

fn guardrail_violation_event(run_id: &str, violation: &GuardrailViolation) -> Event {
    let mut event = Event::new(run_id, "guardrail_violation")
        .with_meta("task_id", violation.task_id.clone())
        .with_meta("rule_id", violation.rule_id.clone())
        .with_meta("message", violation.message.clone());
    if let Some(path) = violation.offending_paths.first() {
        event = event.with_meta("path", path.clone());
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKind;
    use crate::guardrails::PatternRegistry;
    use crate::resilience::RetryPolicy;
    use std::time::Duration;

    const PATTERN_YAML: &str = r#"
protected_paths: []
noop_ok:
  allowed_tools: [echo_tool]
  path_scope: {}
"#;

    fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("store.sqlite")).unwrap();
        (store, dir)
    }

    fn echo_profile() -> HashMap<String, ToolProfile> {
        let mut profiles = HashMap::new();
        profiles.insert(
            "echo_tool".to_string(),
            ToolProfile {
                command_template: vec!["echo".to_string(), "ok".to_string()],
                env: HashMap::new(),
                default_timeout_seconds: 5,
                placeholders: HashMap::new(),
            },
        );
        profiles
    }

    #[tokio::test]
    async fn successful_run_marks_task_succeeded() {
        let (store, _dir) = test_store();
        let patterns = PatternRegistry::from_yaml(PATTERN_YAML).unwrap();
        let adapter = ResilientAdapter::new(RetryPolicy::new(0, Duration::from_millis(1)), 3, Duration::from_secs(30));
        let profiles = echo_profile();
        let mut router = Router::new(
            crate::router::RouterConfig {
                rules: vec![crate::router::RouteRule {
                    operation_kind: "edit".to_string(),
                    strategy: crate::router::Strategy::Fixed { tool_id: "echo_tool".to_string() },
                }],
            },
            crate::router::RoundRobinCounter::load(_dir.path().join("counters.json")),
        );

        let ledger_path = _dir.path().join("run.ledger.jsonl");
        let executor = Executor::new(&store, &patterns, &adapter, &profiles, &mut router, &ledger_path, ExecutorConfig::default());

        let mut task = Task::new("t1", "ws-1", TaskKind::Implementation, "noop_ok", "edit");
        store.create(&task).unwrap();

        let outcome = executor.execute_task("run-1", &mut task, _dir.path().to_str().unwrap()).await;
        assert_eq!(outcome.status, TaskStatus::Succeeded);
        assert_eq!(task.status, TaskStatus::Succeeded);

        let events = EventLedger::read_all(&ledger_path).unwrap();
        assert!(events.iter().any(|e| e.event == "task_complete"));
    }

    #[tokio::test]
    async fn protected_path_blocks_task_and_emits_violation() {
        const PROTECTED_YAML: &str = r#"
protected_paths: ["secrets/*"]
noop_ok:
  allowed_tools: [echo_tool]
  path_scope: {}
"#;
        let (store, dir) = test_store();
        let patterns = PatternRegistry::from_yaml(PROTECTED_YAML).unwrap();
        let adapter = ResilientAdapter::new(RetryPolicy::new(0, Duration::from_millis(1)), 3, Duration::from_secs(30));
        let profiles = echo_profile();
        let mut router = Router::new(
            crate::router::RouterConfig {
                rules: vec![crate::router::RouteRule {
                    operation_kind: "edit".to_string(),
                    strategy: crate::router::Strategy::Fixed { tool_id: "echo_tool".to_string() },
                }],
            },
            crate::router::RoundRobinCounter::load(dir.path().join("counters.json")),
        );

        let ledger_path = dir.path().join("run.ledger.jsonl");
        let executor = Executor::new(&store, &patterns, &adapter, &profiles, &mut router, &ledger_path, ExecutorConfig::default());

        let mut task = Task::new("t1", "ws-1", TaskKind::Implementation, "noop_ok", "edit");
        task.file_scope = vec!["secrets/key.pem".to_string()];
        store.create(&task).unwrap();

        let outcome = executor.execute_task("run-1", &mut task, dir.path().to_str().unwrap()).await;
        assert_eq!(outcome.status, TaskStatus::Blocked);
        assert!(outcome.violations.iter().any(|v| v.rule_id == "protected_path"));

        let events = EventLedger::read_all(&ledger_path).unwrap();
        let violation_event = events.iter().find(|e| e.event == "guardrail_violation").expect("guardrail_violation event emitted");
        assert_eq!(violation_event.meta.get("rule_id").unwrap(), "protected_path");
        assert_eq!(violation_event.meta.get("path").unwrap(), "secrets/key.pem");
    }

    #[tokio::test]
    async fn missing_pattern_blocks_task() {
        let (store, dir) = test_store();
        let patterns = PatternRegistry::from_yaml(PATTERN_YAML).unwrap();
        let adapter = ResilientAdapter::new(RetryPolicy::new(0, Duration::from_millis(1)), 3, Duration::from_secs(30));
        let profiles = echo_profile();
        let mut router = Router::new(
            crate::router::RouterConfig { rules: vec![] },
            crate::router::RoundRobinCounter::load(dir.path().join("counters.json")),
        );
        let ledger_path = dir.path().join("run.ledger.jsonl");
        let executor = Executor::new(&store, &patterns, &adapter, &profiles, &mut router, &ledger_path, ExecutorConfig::default());

        let mut task = Task::new("t1", "ws-1", TaskKind::Implementation, "nonexistent_pattern", "edit");
        store.create(&task).unwrap();

        let outcome = executor.execute_task("run-1", &mut task, dir.path().to_str().unwrap()).await;
        assert_eq!(outcome.status, TaskStatus::Blocked);
    }
}
