//! Workstream: an opaque cluster of gaps grouped at the planning layer

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statestore::{now_ms, IndexValue, Record};

/// A cluster of related gaps, created during PLANNING and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workstream {
    pub id: String,
    pub run_id: String,
    pub priority_score: f64,
    pub file_scope: Vec<String>,
    pub depends_on: Vec<String>,
    pub estimated_effort: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Workstream {
    /// Id is derived from the run id and cluster index, so it is stable
    /// across re-planning of the same run.
    pub fn new(run_id: impl Into<String>, cluster_index: usize) -> Self {
        let run_id = run_id.into();
        let now = now_ms();
        Self {
            id: format!("{run_id}-ws-{cluster_index:04}"),
            run_id,
            priority_score: 0.0,
            file_scope: Vec::new(),
            depends_on: Vec::new(),
            estimated_effort: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, score: f64) -> Self {
        self.priority_score = score;
        self
    }

    pub fn with_file_scope(mut self, scope: Vec<String>) -> Self {
        self.file_scope = scope;
        self
    }

    pub fn with_dependency(mut self, workstream_id: impl Into<String>) -> Self {
        self.depends_on.push(workstream_id.into());
        self
    }
}

impl Record for Workstream {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "workstreams"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("run_id".to_string(), IndexValue::String(self.run_id.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_for_same_run_and_index() {
        let a = Workstream::new("run-1", 2);
        let b = Workstream::new("run-1", 2);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_clusters_get_different_ids() {
        let a = Workstream::new("run-1", 0);
        let b = Workstream::new("run-1", 1);
        assert_ne!(a.id, b.id);
    }
}
