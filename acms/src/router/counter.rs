use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RoundRobinCounterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterFile {
    #[serde(default)]
    cursors: HashMap<String, u64>,
}

/// A round-robin cursor per rule name, persisted as a small JSON file under
/// `dirs::data_local_dir()`. A corrupt file is treated as empty rather than
/// failing the router — the rotation just resets.
pub struct RoundRobinCounter {
    path: PathBuf,
    cursors: HashMap<String, u64>,
}

impl RoundRobinCounter {
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("acms")
            .join("router_counters.json")
    }

    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cursors = Self::read(&path).unwrap_or_else(|err| {
            warn!(?err, ?path, "round-robin counter file unreadable, resetting");
            HashMap::new()
        });
        Self { path, cursors }
    }

    fn read(path: &Path) -> Result<HashMap<String, u64>, RoundRobinCounterError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let text = std::fs::read_to_string(path)?;
        let file: CounterFile = serde_json::from_str(&text)?;
        Ok(file.cursors)
    }

    /// Returns the current cursor for `rule_name` then advances it mod
    /// `candidate_count`, persisting the new value. Best-effort persistence:
    /// a write failure is logged, never propagated — the in-memory cursor
    /// still advances for the lifetime of the process.
    pub fn next(&mut self, rule_name: &str, candidate_count: usize) -> usize {
        if candidate_count == 0 {
            return 0;
        }
        let cursor = self.cursors.entry(rule_name.to_string()).or_insert(0);
        let chosen = (*cursor as usize) % candidate_count;
        *cursor = (*cursor + 1) % candidate_count as u64;
        if let Err(err) = self.persist() {
            warn!(?err, path = ?self.path, "failed to persist round-robin counter");
        }
        chosen
    }

    fn persist(&self) -> Result<(), RoundRobinCounterError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CounterFile { cursors: self.cursors.clone() };
        let text = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_candidates_and_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        let mut counter = RoundRobinCounter::load(&path);
        assert_eq!(counter.next("r1", 3), 0);
        assert_eq!(counter.next("r1", 3), 1);
        assert_eq!(counter.next("r1", 3), 2);
        assert_eq!(counter.next("r1", 3), 0);
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        {
            let mut counter = RoundRobinCounter::load(&path);
            assert_eq!(counter.next("r1", 2), 0);
        }
        let mut reloaded = RoundRobinCounter::load(&path);
        assert_eq!(reloaded.next("r1", 2), 1);
    }

    #[test]
    fn corrupt_file_resets_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        std::fs::write(&path, "not json").unwrap();
        let mut counter = RoundRobinCounter::load(&path);
        assert_eq!(counter.next("r1", 2), 0);
    }

    #[test]
    fn separate_rules_have_independent_cursors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        let mut counter = RoundRobinCounter::load(&path);
        assert_eq!(counter.next("a", 2), 0);
        assert_eq!(counter.next("b", 2), 0);
        assert_eq!(counter.next("a", 2), 1);
    }
}
