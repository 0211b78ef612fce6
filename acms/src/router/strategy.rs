use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::counter::RoundRobinCounter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum Strategy {
    Fixed { tool_id: String },
    RoundRobin { candidates: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    pub operation_kind: String,
    #[serde(flatten)]
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    pub rules: Vec<RouteRule>,
}

/// Resolves an `operation_kind` to a tool id. Pure lookup plus the small
/// bit of state a round-robin rule needs to remember its place.
pub struct Router {
    rules: HashMap<String, Strategy>,
    counter: RoundRobinCounter,
}

impl Router {
    pub fn new(config: RouterConfig, counter: RoundRobinCounter) -> Self {
        let rules = config.rules.into_iter().map(|r| (r.operation_kind, r.strategy)).collect();
        Self { rules, counter }
    }

    /// Returns `None` when no rule matches the operation kind — callers
    /// treat this as an unroutable task, not a panic.
    pub fn route(&mut self, operation_kind: &str) -> Option<String> {
        match self.rules.get(operation_kind)? {
            Strategy::Fixed { tool_id } => Some(tool_id.clone()),
            Strategy::RoundRobin { candidates } => {
                if candidates.is_empty() {
                    return None;
                }
                let idx = self.counter.next(operation_kind, candidates.len());
                Some(candidates[idx].clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_with(dir: &tempfile::TempDir, rules: Vec<RouteRule>) -> Router {
        let counter = RoundRobinCounter::load(dir.path().join("counters.json"));
        Router::new(RouterConfig { rules }, counter)
    }

    #[test]
    fn fixed_strategy_always_returns_same_tool() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = router_with(&dir, vec![RouteRule {
            operation_kind: "edit".to_string(),
            strategy: Strategy::Fixed { tool_id: "editor".to_string() },
        }]);
        assert_eq!(router.route("edit"), Some("editor".to_string()));
        assert_eq!(router.route("edit"), Some("editor".to_string()));
    }

    #[test]
    fn round_robin_cycles_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = router_with(&dir, vec![RouteRule {
            operation_kind: "edit".to_string(),
            strategy: Strategy::RoundRobin { candidates: vec!["a".to_string(), "b".to_string()] },
        }]);
        assert_eq!(router.route("edit"), Some("a".to_string()));
        assert_eq!(router.route("edit"), Some("b".to_string()));
        assert_eq!(router.route("edit"), Some("a".to_string()));
    }

    #[test]
    fn unknown_operation_kind_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = router_with(&dir, vec![]);
        assert_eq!(router.route("nonexistent"), None);
    }
}
