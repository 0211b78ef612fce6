//! Path Registry: configuration-driven indirection from symbolic dotted
//! keys to filesystem paths. All core components acquire paths exclusively
//! through this registry — no hard-coded paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("unknown path key: {0}")]
    UnknownKey(String),

    #[error("template for {key} references undefined variable {{{var}}}")]
    MissingVar { key: String, var: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type PathResult<T> = Result<T, PathError>;

/// Maps dotted keys (`acms.runs.ledger`) to path templates
/// (`.acms_runs/{run_id}/run.ledger.jsonl`).
#[derive(Debug, Clone, Default)]
pub struct PathRegistry {
    root: PathBuf,
    templates: HashMap<String, String>,
}

impl PathRegistry {
    /// Load a path index (a flat YAML map of dotted key -> template string)
    /// rooted at `root` for resolution of relative templates.
    pub fn load(index_path: impl AsRef<Path>, root: impl Into<PathBuf>) -> PathResult<Self> {
        let text = std::fs::read_to_string(index_path)?;
        let templates: HashMap<String, String> = serde_yaml::from_str(&text)?;
        Ok(Self { root: root.into(), templates })
    }

    pub fn from_templates(templates: HashMap<String, String>, root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), templates }
    }

    /// Resolve `key` to a concrete path, substituting `{var}` placeholders
    /// from `vars`. Fails explicitly if a required variable is absent.
    pub fn resolve(&self, key: &str, vars: &HashMap<String, String>) -> PathResult<PathBuf> {
        let template = self.templates.get(key).ok_or_else(|| PathError::UnknownKey(key.to_string()))?;
        let resolved = substitute(key, template, vars)?;
        Ok(self.root.join(resolved))
    }

    /// Resolve `key` and ensure the resulting directory exists, creating it
    /// (and parents) if necessary.
    pub fn ensure_dir(&self, key: &str, vars: &HashMap<String, String>) -> PathResult<PathBuf> {
        let path = self.resolve(key, vars)?;
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

fn substitute(key: &str, template: &str, vars: &HashMap<String, String>) -> PathResult<String> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let var = &template[i + 1..i + end];
                let value = vars.get(var).ok_or_else(|| PathError::MissingVar {
                    key: key.to_string(),
                    var: var.to_string(),
                })?;
                out.push_str(value);
                i += end + 1;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PathRegistry {
        let mut templates = HashMap::new();
        templates.insert("acms.runs.ledger".to_string(), ".acms_runs/{run_id}/run.ledger.jsonl".to_string());
        templates.insert("acms.runs.root".to_string(), ".acms_runs/{run_id}".to_string());
        PathRegistry::from_templates(templates, "/repo")
    }

    #[test]
    fn resolves_with_substituted_variable() {
        let reg = registry();
        let mut vars = HashMap::new();
        vars.insert("run_id".to_string(), "abc123".to_string());
        let path = reg.resolve("acms.runs.ledger", &vars).unwrap();
        assert_eq!(path, PathBuf::from("/repo/.acms_runs/abc123/run.ledger.jsonl"));
    }

    #[test]
    fn missing_variable_is_explicit_error() {
        let reg = registry();
        let err = reg.resolve("acms.runs.ledger", &HashMap::new()).unwrap_err();
        assert!(matches!(err, PathError::MissingVar { .. }));
    }

    #[test]
    fn unknown_key_is_explicit_error() {
        let reg = registry();
        let err = reg.resolve("nope", &HashMap::new()).unwrap_err();
        assert!(matches!(err, PathError::UnknownKey(_)));
    }

    #[test]
    fn resolve_is_referentially_transparent() {
        let reg = registry();
        let mut vars = HashMap::new();
        vars.insert("run_id".to_string(), "abc123".to_string());
        let a = reg.resolve("acms.runs.root", &vars).unwrap();
        let b = reg.resolve("acms.runs.root", &vars).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ensure_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut templates = HashMap::new();
        templates.insert("acms.runs.root".to_string(), ".acms_runs/{run_id}".to_string());
        let reg = PathRegistry::from_templates(templates, dir.path());
        let mut vars = HashMap::new();
        vars.insert("run_id".to_string(), "abc123".to_string());
        let path = reg.ensure_dir("acms.runs.root", &vars).unwrap();
        assert!(path.is_dir());
    }
}
