//! Named predicates. Patterns reference prechecks/postchecks by name; the
//! `name -> predicate` mapping is the only place new checks are added —
//! adding a pattern never requires a code change, adding a predicate does.

use std::path::Path;

pub struct PrecheckInput<'a> {
    pub task_id: &'a str,
    pub file_scope: &'a [String],
    pub tools: &'a [String],
    pub operations: &'a [String],
    pub context: &'a serde_json::Value,
}

pub struct PostcheckInput<'a> {
    pub task_id: &'a str,
    pub changed_files: &'a [String],
    pub changed_lines: u32,
    pub changed_hunks: u32,
    pub expected_outputs: &'a [String],
    pub claimed_success: bool,
    pub verification: &'a serde_json::Value,
}

pub type PrecheckFn = fn(&PrecheckInput) -> bool;
pub type PostcheckFn = fn(&PostcheckInput) -> bool;

/// Resolve a named precheck. Unknown names fail closed (the precheck
/// reports failure) so a typo in a pattern never silently passes.
pub fn precheck_by_name(name: &str) -> Option<PrecheckFn> {
    match name {
        "file_scope_non_empty" => Some(file_scope_non_empty as PrecheckFn),
        "operations_declared" => Some(operations_declared as PrecheckFn),
        _ => None,
    }
}

pub fn postcheck_by_name(name: &str) -> Option<PostcheckFn> {
    match name {
        "expected_outputs_exist" => Some(expected_outputs_exist as PostcheckFn),
        "verification_exit_code_zero" => Some(verification_exit_code_zero as PostcheckFn),
        _ => None,
    }
}

fn file_scope_non_empty(input: &PrecheckInput) -> bool {
    !input.file_scope.is_empty()
}

fn operations_declared(input: &PrecheckInput) -> bool {
    !input.operations.is_empty() || input.context.get("operations").is_some()
}

fn expected_outputs_exist(input: &PostcheckInput) -> bool {
    input.expected_outputs.iter().all(|p| Path::new(p).exists())
}

/// Detects the hallucinated-success anti-pattern: the tool claimed success
/// but its own reported verification says otherwise.
fn verification_exit_code_zero(input: &PostcheckInput) -> bool {
    match input.verification.get("exit_code").and_then(serde_json::Value::as_i64) {
        Some(code) => code == 0,
        None => true,
    }
}
