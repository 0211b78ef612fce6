use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::TaskStatus;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task graph contains a cycle involving: {0:?}")]
    Cycle(Vec<String>),

    #[error("unknown task id: {0}")]
    UnknownTask(String),
}

struct Inner {
    status: HashMap<String, TaskStatus>,
    depends_on: HashMap<String, Vec<String>>,
    /// inverse adjacency: task id -> ids of tasks that depend on it
    reverse_deps: HashMap<String, Vec<String>>,
}

/// Maintains a DAG of tasks keyed by task id, with an inverse-adjacency
/// index for O(1) "who depends on me" queries on promotion.
pub struct Scheduler {
    inner: Mutex<Inner>,
}

impl Scheduler {
    /// Build a scheduler from `(task_id, depends_on)` pairs. Detects cycles
    /// by depth-first search at construction time; a cyclic graph is a
    /// structured error, never allowed to reach execution.
    pub fn new(tasks: Vec<(String, Vec<String>)>) -> Result<Self, SchedulerError> {
        let mut depends_on: HashMap<String, Vec<String>> = HashMap::new();
        let mut status: HashMap<String, TaskStatus> = HashMap::new();
        let mut reverse_deps: HashMap<String, Vec<String>> = HashMap::new();

        for (id, deps) in &tasks {
            depends_on.insert(id.clone(), deps.clone());
            status.insert(id.clone(), TaskStatus::Pending);
            reverse_deps.entry(id.clone()).or_default();
        }
        for (id, deps) in &tasks {
            for dep in deps {
                reverse_deps.entry(dep.clone()).or_default().push(id.clone());
            }
        }

        detect_cycle(&depends_on)?;

        let mut scheduler = Self { inner: Mutex::new(Inner { status, depends_on, reverse_deps }) };
        scheduler.promote_initial_ready();
        Ok(scheduler)
    }

    fn promote_initial_ready(&mut self) {
        let inner = self.inner.get_mut();
        let ids: Vec<String> = inner.status.keys().cloned().collect();
        for id in ids {
            let deps = inner.depends_on.get(&id).cloned().unwrap_or_default();
            if deps.is_empty() {
                inner.status.insert(id, TaskStatus::Ready);
            }
        }
    }

    /// Update a task's state. On promotion to `succeeded`, scans only
    /// `reverse_deps[id]` and promotes any newly-satisfied dependent to
    /// `ready`.
    pub async fn mark_task(&self, id: &str, new_state: TaskStatus) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock().await;
        if !inner.status.contains_key(id) {
            return Err(SchedulerError::UnknownTask(id.to_string()));
        }
        inner.status.insert(id.to_string(), new_state);

        if new_state == TaskStatus::Succeeded {
            let dependents = inner.reverse_deps.get(id).cloned().unwrap_or_default();
            for dependent in dependents {
                let ready = inner.depends_on.get(&dependent).map(|deps| {
                    deps.iter().all(|d| inner.status.get(d) == Some(&TaskStatus::Succeeded))
                }).unwrap_or(false);
                if ready && inner.status.get(&dependent) == Some(&TaskStatus::Pending) {
                    inner.status.insert(dependent, TaskStatus::Ready);
                }
            }
        }
        Ok(())
    }

    /// All tasks currently in `ready` state, lexicographically sorted.
    pub async fn ready_tasks(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut ready: Vec<String> = inner.status.iter().filter(|(_, s)| **s == TaskStatus::Ready).map(|(id, _)| id.clone()).collect();
        ready.sort();
        ready
    }

    /// The next batch of `ready` tasks, capped at `max_parallel`, tie-broken
    /// by the task id's lexicographic order. Calling this repeatedly with no
    /// intervening `mark_task` calls returns the same batch.
    pub async fn parallel_batches(&self, max_parallel: usize) -> Vec<String> {
        let mut ready = self.ready_tasks().await;
        ready.truncate(max_parallel);
        ready
    }

    /// Full topological sort (Kahn's algorithm), O(V + E). Used for
    /// dry-runs and plan validation; does not consult current task status.
    pub async fn execution_order(&self) -> Result<Vec<String>, SchedulerError> {
        let inner = self.inner.lock().await;
        kahn_order(&inner.depends_on)
    }

    /// True when every task is in a terminal state.
    pub async fn is_complete(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.status.values().all(TaskStatus::is_terminal)
    }

    pub async fn status_of(&self, id: &str) -> Option<TaskStatus> {
        let inner = self.inner.lock().await;
        inner.status.get(id).copied()
    }
}

fn detect_cycle(depends_on: &HashMap<String, Vec<String>>) -> Result<(), SchedulerError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = depends_on.keys().map(|k| (k.as_str(), Mark::Unvisited)).collect();
    let mut path = Vec::new();

    fn visit<'a>(
        id: &'a str,
        depends_on: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<String>,
    ) -> Result<(), SchedulerError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                path.push(id.to_string());
                return Err(SchedulerError::Cycle(path.clone()));
            }
            _ => {}
        }
        marks.insert(id, Mark::InProgress);
        path.push(id.to_string());
        if let Some(deps) = depends_on.get(id) {
            for dep in deps {
                visit(dep, depends_on, marks, path)?;
            }
        }
        path.pop();
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let ids: Vec<String> = depends_on.keys().cloned().collect();
    for id in &ids {
        visit(id, depends_on, &mut marks, &mut path)?;
    }
    Ok(())
}

fn kahn_order(depends_on: &HashMap<String, Vec<String>>) -> Result<Vec<String>, SchedulerError> {
    let mut in_degree: HashMap<String, usize> = depends_on.keys().map(|k| (k.clone(), 0)).collect();
    let mut forward: HashMap<String, Vec<String>> = depends_on.keys().map(|k| (k.clone(), Vec::new())).collect();

    for (id, deps) in depends_on {
        *in_degree.get_mut(id).unwrap() += deps.len();
        for dep in deps {
            forward.entry(dep.clone()).or_default().push(id.clone());
        }
    }

    let mut frontier: VecDeque<String> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| id.clone()).collect();
    let mut frontier_vec: Vec<String> = frontier.drain(..).collect();
    frontier_vec.sort();
    let mut queue: VecDeque<String> = frontier_vec.into();

    let mut order = Vec::with_capacity(depends_on.len());
    let mut visited: HashSet<String> = HashSet::new();

    while let Some(id) = queue.pop_front() {
        order.push(id.clone());
        visited.insert(id.clone());
        let mut newly_ready = Vec::new();
        if let Some(dependents) = forward.get(&id) {
            for dependent in dependents {
                let degree = in_degree.get_mut(dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(dependent.clone());
                }
            }
        }
        newly_ready.sort();
        for id in newly_ready {
            queue.push_back(id);
        }
    }

    if order.len() != depends_on.len() {
        let remaining: Vec<String> = depends_on.keys().filter(|id| !visited.contains(*id)).cloned().collect();
        return Err(SchedulerError::Cycle(remaining));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Scheduler {
        Scheduler::new(vec![
            ("A".to_string(), vec![]),
            ("B".to_string(), vec!["A".to_string()]),
            ("C".to_string(), vec!["B".to_string()]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn zero_dep_tasks_start_ready() {
        let s = Scheduler::new(vec![("A".to_string(), vec![])]).unwrap();
        assert_eq!(s.ready_tasks().await, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn dependent_is_not_ready_until_dependency_succeeds() {
        let s = chain();
        assert_eq!(s.ready_tasks().await, vec!["A".to_string()]);
        s.mark_task("A", TaskStatus::Succeeded).await.unwrap();
        assert_eq!(s.ready_tasks().await, vec!["B".to_string()]);
        s.mark_task("B", TaskStatus::Succeeded).await.unwrap();
        assert_eq!(s.ready_tasks().await, vec!["C".to_string()]);
    }

    #[tokio::test]
    async fn cycle_is_rejected_at_construction() {
        let result = Scheduler::new(vec![
            ("A".to_string(), vec!["B".to_string()]),
            ("B".to_string(), vec!["A".to_string()]),
        ]);
        assert!(matches!(result, Err(SchedulerError::Cycle(_))));
    }

    #[tokio::test]
    async fn parallel_batch_respects_max_parallel_and_lexicographic_order() {
        let s = Scheduler::new(vec![
            ("A".to_string(), vec![]),
            ("B".to_string(), vec![]),
            ("C".to_string(), vec![]),
        ])
        .unwrap();
        let first = s.parallel_batches(2).await;
        assert_eq!(first, vec!["A".to_string(), "B".to_string()]);
        s.mark_task("A", TaskStatus::Succeeded).await.unwrap();
        s.mark_task("B", TaskStatus::Succeeded).await.unwrap();
        let second = s.parallel_batches(2).await;
        assert_eq!(second, vec!["C".to_string()]);
    }

    #[tokio::test]
    async fn parallel_batches_is_idempotent_with_no_state_change() {
        let s = Scheduler::new(vec![("A".to_string(), vec![]), ("B".to_string(), vec![])]).unwrap();
        let first = s.parallel_batches(5).await;
        let second = s.parallel_batches(5).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn execution_order_is_a_valid_topological_sort() {
        let s = chain();
        let order = s.execution_order().await.unwrap();
        assert_eq!(order, vec!["A".to_string(), "B".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn blocked_task_never_promotes_dependents() {
        let s = chain();
        s.mark_task("A", TaskStatus::Blocked).await.unwrap();
        assert!(s.ready_tasks().await.is_empty());
        assert_eq!(s.status_of("B").await, Some(TaskStatus::Pending));
    }

    #[tokio::test]
    async fn is_complete_requires_all_terminal() {
        let s = chain();
        assert!(!s.is_complete().await);
        s.mark_task("A", TaskStatus::Succeeded).await.unwrap();
        s.mark_task("B", TaskStatus::Succeeded).await.unwrap();
        s.mark_task("C", TaskStatus::Succeeded).await.unwrap();
        assert!(s.is_complete().await);
    }

    #[tokio::test]
    async fn zero_task_plan_is_immediately_complete() {
        let s = Scheduler::new(vec![]).unwrap();
        assert!(s.is_complete().await);
    }
}
