//! Session: an optional long-lived AI-agent handle, integrates with the
//! patch ledger when enabled. Not required by the core.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statestore::{now_ms, IndexValue, Record};

use super::id::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Created,
    Active,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub agent_kind: String,
    pub workspace_path: String,
    pub state: SessionState,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    pub fn new(project_id: impl Into<String>, agent_kind: impl Into<String>, workspace_path: impl Into<String>) -> Self {
        let project_id = project_id.into();
        let now = now_ms();
        Self {
            id: generate_id("session", &project_id),
            project_id,
            agent_kind: agent_kind.into(),
            workspace_path: workspace_path.into(),
            state: SessionState::Created,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.updated_at = now_ms();
    }
}

impl Record for Session {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "sessions"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("project_id".to_string(), IndexValue::String(self.project_id.clone()));
        fields.insert("state".to_string(), IndexValue::String(self.state.to_string()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_created() {
        let s = Session::new("proj-1", "code-editor", "/tmp/ws");
        assert_eq!(s.state, SessionState::Created);
    }

    #[test]
    fn set_state_bumps_updated_at() {
        let mut s = Session::new("proj-1", "code-editor", "/tmp/ws");
        let before = s.updated_at;
        s.set_state(SessionState::Active);
        assert_eq!(s.state, SessionState::Active);
        assert!(s.updated_at >= before);
    }
}
