use std::collections::HashMap;
use std::path::Path;

use glob::Pattern as GlobPattern;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{GuardrailViolation, Pattern, Severity};

use super::predicates::{postcheck_by_name, precheck_by_name, PostcheckInput, PrecheckInput};

#[derive(Debug, Error)]
pub enum PatternRegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown pattern id: {0}")]
    UnknownPattern(String),

    #[error("invalid glob {glob}: {reason}")]
    InvalidGlob { glob: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct PatternIndexFile {
    #[serde(default)]
    protected_paths: Vec<String>,
    #[serde(flatten)]
    patterns: HashMap<String, Pattern>,
}

pub struct PatternRegistry {
    patterns: HashMap<String, Pattern>,
    protected_paths: Vec<String>,
}

impl PatternRegistry {
    pub fn load(index_path: impl AsRef<Path>) -> Result<Self, PatternRegistryError> {
        let text = std::fs::read_to_string(index_path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, PatternRegistryError> {
        let mut file: PatternIndexFile = serde_yaml::from_str(text)?;
        for (id, pattern) in file.patterns.iter_mut() {
            pattern.id = id.clone();
        }
        Ok(Self { patterns: file.patterns, protected_paths: file.protected_paths })
    }

    pub fn validate_pattern_exists(&self, id: &str) -> Result<(), PatternRegistryError> {
        if self.patterns.contains_key(id) {
            Ok(())
        } else {
            Err(PatternRegistryError::UnknownPattern(id.to_string()))
        }
    }

    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.patterns.get(id)
    }

    pub fn protected_paths(&self) -> &[String] {
        &self.protected_paths
    }

    /// Verifies: pattern exists and enabled; declared paths match include
    /// globs and miss exclude/protected globs; declared tools are a subset
    /// of allowed_tools; declared operations don't intersect
    /// forbidden_operations; each named precheck passes.
    pub fn pre_execution_check(&self, pattern_id: &str, input: &PrecheckInput) -> (bool, Vec<GuardrailViolation>) {
        let mut violations = Vec::new();

        let Some(pattern) = self.patterns.get(pattern_id) else {
            violations.push(GuardrailViolation::new(
                "unknown_pattern",
                Severity::Fatal,
                format!("pattern {pattern_id} does not exist"),
                input.task_id,
                pattern_id,
            ));
            return (false, violations);
        };

        if !pattern.enabled {
            violations.push(GuardrailViolation::new("pattern_disabled", Severity::Error, "pattern is disabled", input.task_id, pattern_id));
        }

        for path in input.file_scope {
            if self.is_protected(path) {
                violations.push(
                    GuardrailViolation::new("protected_path", Severity::Fatal, format!("{path} is protected"), input.task_id, pattern_id)
                        .with_path(path.clone()),
                );
                continue;
            }
            if !path_matches_scope(pattern, path) {
                violations.push(
                    GuardrailViolation::new("path_out_of_scope", Severity::Error, format!("{path} is outside pattern path scope"), input.task_id, pattern_id)
                        .with_path(path.clone()),
                );
            }
        }

        for tool in input.tools {
            if !pattern.allows_tool(tool) {
                violations.push(GuardrailViolation::new(
                    "tool_not_allowed",
                    Severity::Error,
                    format!("tool {tool} is not in allowed_tools"),
                    input.task_id,
                    pattern_id,
                ));
            }
        }

        for op in input.operations {
            if pattern.forbids_operation(op) {
                violations.push(GuardrailViolation::new(
                    "forbidden_operation",
                    Severity::Fatal,
                    format!("operation {op} is forbidden"),
                    input.task_id,
                    pattern_id,
                ));
            }
        }

        for name in &pattern.required_prechecks {
            let passed = precheck_by_name(name).map(|f| f(input)).unwrap_or(false);
            if !passed {
                violations.push(GuardrailViolation::new(
                    "precheck_failed",
                    Severity::Error,
                    format!("precheck {name} failed"),
                    input.task_id,
                    pattern_id,
                ));
            }
        }

        let passed = !violations.iter().any(GuardrailViolation::is_fatal);
        (passed, violations)
    }

    /// Verifies: named postchecks pass; change counts within max_changes;
    /// expected outputs exist; exit code consistency (hallucinated success).
    pub fn post_execution_check(&self, pattern_id: &str, input: &PostcheckInput) -> (bool, Vec<GuardrailViolation>) {
        let mut violations = Vec::new();

        let Some(pattern) = self.patterns.get(pattern_id) else {
            violations.push(GuardrailViolation::new(
                "unknown_pattern",
                Severity::Fatal,
                format!("pattern {pattern_id} does not exist"),
                input.task_id,
                pattern_id,
            ));
            return (false, violations);
        };

        if let Some(max_files) = pattern.max_changes.files {
            if input.changed_files.len() as u32 > max_files {
                violations.push(GuardrailViolation::new("max_files_exceeded", Severity::Error, "too many files changed", input.task_id, pattern_id));
            }
        }
        if let Some(max_lines) = pattern.max_changes.lines {
            if input.changed_lines > max_lines {
                violations.push(GuardrailViolation::new("max_lines_exceeded", Severity::Error, "too many lines changed", input.task_id, pattern_id));
            }
        }
        if let Some(max_hunks) = pattern.max_changes.hunks {
            if input.changed_hunks > max_hunks {
                violations.push(GuardrailViolation::new("max_hunks_exceeded", Severity::Error, "too many hunks changed", input.task_id, pattern_id));
            }
        }

        for name in &pattern.required_postchecks {
            let passed = postcheck_by_name(name).map(|f| f(input)).unwrap_or(false);
            if !passed {
                let is_hallucination = name == "verification_exit_code_zero" && input.claimed_success;
                violations.push(GuardrailViolation::new(
                    if is_hallucination { "AP_HALLUCINATED_SUCCESS" } else { "postcheck_failed" },
                    Severity::Error,
                    format!("postcheck {name} failed"),
                    input.task_id,
                    pattern_id,
                ));
            }
        }

        let passed = !violations.iter().any(GuardrailViolation::is_fatal) && violations.is_empty();
        (passed, violations)
    }

    fn is_protected(&self, path: &str) -> bool {
        self.protected_paths.iter().any(|g| glob_matches(g, path))
    }
}

fn path_matches_scope(pattern: &Pattern, path: &str) -> bool {
    let included = pattern.path_scope.include.is_empty() || pattern.path_scope.include.iter().any(|g| glob_matches(g, path));
    let excluded = pattern.path_scope.exclude.iter().any(|g| glob_matches(g, path));
    included && !excluded
}

fn glob_matches(glob: &str, path: &str) -> bool {
    GlobPattern::new(glob).map(|p| p.matches(path)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
protected_paths:
  - ".git/**"
noop_ok:
  allowed_tools: [editor]
  path_scope:
    include: ["src/**"]
  max_changes:
    files: 2
"#;

    fn registry() -> PatternRegistry {
        PatternRegistry::from_yaml(YAML).unwrap()
    }

    #[test]
    fn validate_pattern_exists_distinguishes_known_unknown() {
        let reg = registry();
        assert!(reg.validate_pattern_exists("noop_ok").is_ok());
        assert!(reg.validate_pattern_exists("nope").is_err());
    }

    #[test]
    fn protected_path_blocks_pre_execution() {
        let reg = registry();
        let ctx = serde_json::Value::Null;
        let input = PrecheckInput {
            task_id: "t1",
            file_scope: &[".git/objects/x".to_string()],
            tools: &["editor".to_string()],
            operations: &[],
            context: &ctx,
        };
        let (passed, violations) = reg.pre_execution_check("noop_ok", &input);
        assert!(!passed);
        assert!(violations.iter().any(|v| v.rule_id == "protected_path"));
    }

    #[test]
    fn in_scope_path_and_allowed_tool_pass() {
        let reg = registry();
        let ctx = serde_json::Value::Null;
        let input = PrecheckInput {
            task_id: "t1",
            file_scope: &["src/lib.rs".to_string()],
            tools: &["editor".to_string()],
            operations: &[],
            context: &ctx,
        };
        let (passed, violations) = reg.pre_execution_check("noop_ok", &input);
        assert!(passed, "{violations:?}");
    }

    #[test]
    fn disallowed_tool_fails_pre_execution() {
        let reg = registry();
        let ctx = serde_json::Value::Null;
        let input = PrecheckInput {
            task_id: "t1",
            file_scope: &["src/lib.rs".to_string()],
            tools: &["shell".to_string()],
            operations: &[],
            context: &ctx,
        };
        let (passed, _) = reg.pre_execution_check("noop_ok", &input);
        assert!(!passed);
    }

    #[test]
    fn max_files_exceeded_fails_post_execution() {
        let reg = registry();
        let verification = serde_json::json!({});
        let input = PostcheckInput {
            task_id: "t1",
            changed_files: &["a.rs".to_string(), "b.rs".to_string(), "c.rs".to_string()],
            changed_lines: 0,
            changed_hunks: 0,
            expected_outputs: &[],
            claimed_success: true,
            verification: &verification,
        };
        let (passed, violations) = reg.post_execution_check("noop_ok", &input);
        assert!(!passed);
        assert!(violations.iter().any(|v| v.rule_id == "max_files_exceeded"));
    }
}
