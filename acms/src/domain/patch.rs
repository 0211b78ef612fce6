//! Patch: a state machine over a produced diff or file operation

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statestore::{now_ms, IndexValue, Record};

use super::id::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Created,
    Validated,
    Queued,
    Applied,
    Verified,
    Committed,
    AwaitingReview,
    Rejected,
    ApplyFailed,
    RolledBack,
    Quarantined,
    Dropped,
}

impl PatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PatchStatus::Committed
                | PatchStatus::Dropped
                | PatchStatus::Rejected
                | PatchStatus::Quarantined
                | PatchStatus::RolledBack
        )
    }
}

impl std::fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PatchStatus::Created => "created",
            PatchStatus::Validated => "validated",
            PatchStatus::Queued => "queued",
            PatchStatus::Applied => "applied",
            PatchStatus::Verified => "verified",
            PatchStatus::Committed => "committed",
            PatchStatus::AwaitingReview => "awaiting_review",
            PatchStatus::Rejected => "rejected",
            PatchStatus::ApplyFailed => "apply_failed",
            PatchStatus::RolledBack => "rolled_back",
            PatchStatus::Quarantined => "quarantined",
            PatchStatus::Dropped => "dropped",
        };
        write!(f, "{s}")
    }
}

/// One entry in a patch's transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchTransition {
    pub from: PatchStatus,
    pub to: PatchStatus,
    pub at: i64,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    pub run_id: String,
    pub task_id: String,
    pub status: PatchStatus,
    pub diff_summary: serde_json::Value,
    pub history: Vec<PatchTransition>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Patch {
    pub fn new(run_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        let now = now_ms();
        let task_id = task_id.into();
        Self {
            id: generate_id("patch", &task_id),
            run_id: run_id.into(),
            task_id,
            status: PatchStatus::Created,
            diff_summary: serde_json::Value::Null,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> PatchStatus {
        self.status
    }
}

impl Record for Patch {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "patches"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("run_id".to_string(), IndexValue::String(self.run_id.clone()));
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields
    }
}
