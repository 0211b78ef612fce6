//! Tool profiles: templatized command lines with placeholders
//! (`{model}`, `{prompt_file}`, `{files...}`), loaded from configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Task, ToolRunRequest};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolProfile {
    pub command_template: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub default_timeout_seconds: u64,
    #[serde(default)]
    pub placeholders: HashMap<String, String>,
}

/// Translates task metadata into a fully resolved `ToolRunRequest` for a
/// given tool profile.
pub struct ToolRequestBuilder;

impl ToolRequestBuilder {
    pub fn build(tool_id: &str, profile: &ToolProfile, task: &Task, cwd: impl Into<String>) -> ToolRunRequest {
        let files = task.file_scope.join(" ");
        let args: Vec<String> = profile
            .command_template
            .iter()
            .skip(1)
            .map(|arg| substitute_placeholders(arg, task, &files))
            .collect();

        let mut request = ToolRunRequest::new(tool_id, args, cwd, profile.default_timeout_seconds);
        request.env = profile.env.clone();
        request.env.insert("RUN_ID".to_string(), task.workstream_id.clone());
        request.log_context = serde_json::json!({ "task_id": task.id, "operation_kind": task.operation_kind });
        request
    }
}

fn substitute_placeholders(template: &str, task: &Task, files: &str) -> String {
    template
        .replace("{files...}", files)
        .replace("{task_id}", &task.id)
        .replace("{operation_kind}", &task.operation_kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKind;

    fn profile() -> ToolProfile {
        ToolProfile {
            command_template: vec!["editor".to_string(), "--edit".to_string(), "{files...}".to_string()],
            env: HashMap::new(),
            default_timeout_seconds: 30,
            placeholders: HashMap::new(),
        }
    }

    #[test]
    fn substitutes_file_scope_placeholder() {
        let mut task = Task::new("t1", "ws-1", TaskKind::Implementation, "noop_ok", "edit");
        task.file_scope = vec!["src/lib.rs".to_string()];
        let req = ToolRequestBuilder::build("editor", &profile(), &task, "/worktree");
        assert_eq!(req.args, vec!["--edit".to_string(), "src/lib.rs".to_string()]);
        assert_eq!(req.cwd, "/worktree");
        assert_eq!(req.timeout_seconds, 30);
    }
}
