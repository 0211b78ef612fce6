//! Pattern: a declaratively-defined execution envelope (configuration, not code)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathScope {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaxChanges {
    #[serde(default)]
    pub files: Option<u32>,
    #[serde(default)]
    pub lines: Option<u32>,
    #[serde(default)]
    pub hunks: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Pattern {
    #[serde(skip)]
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub path_scope: PathScope,
    #[serde(default)]
    pub max_changes: MaxChanges,
    #[serde(default)]
    pub forbidden_operations: Vec<String>,
    #[serde(default)]
    pub required_prechecks: Vec<String>,
    #[serde(default)]
    pub required_postchecks: Vec<String>,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u32,
}

fn default_true() -> bool {
    true
}

fn default_timeout_minutes() -> u32 {
    10
}

impl Pattern {
    pub fn allows_tool(&self, tool_id: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool_id)
    }

    pub fn forbids_operation(&self, operation: &str) -> bool {
        self.forbidden_operations.iter().any(|o| o == operation)
    }
}
