//! Event: an immutable record in the append-only event ledger

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub run_id: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Phase>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(run_id: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            run_id: run_id.into(),
            event: event.into(),
            state: None,
            meta: HashMap::new(),
        }
    }

    pub fn with_state(mut self, state: Phase) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn enter_state(run_id: impl Into<String>, phase: Phase) -> Self {
        Self::new(run_id, "enter_state").with_state(phase)
    }

    pub fn exit_state(run_id: impl Into<String>, phase: Phase) -> Self {
        Self::new(run_id, "exit_state").with_state(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_and_exit_carry_state() {
        let enter = Event::enter_state("run-1", Phase::Execution);
        assert_eq!(enter.event, "enter_state");
        assert_eq!(enter.state, Some(Phase::Execution));
    }

    #[test]
    fn roundtrips_through_json() {
        let e = Event::new("run-1", "task_complete").with_meta("task_id", "t1");
        let json = serde_json::to_string(&e).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, "run-1");
        assert_eq!(back.meta.get("task_id").unwrap(), "t1");
    }
}
