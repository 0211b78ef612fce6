//! Event Ledger: append-only, line-delimited event log, the ground truth
//! for observability. Best-effort durable — a write failure is logged but
//! never blocks execution.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::error;

use crate::domain::Event;

pub struct EventLedger;

impl EventLedger {
    /// Append one event as a single JSON line to `path`. Creates the file
    /// (and its parent directory) if it doesn't exist yet.
    pub fn append(path: impl AsRef<Path>, event: &Event) {
        if let Err(e) = Self::try_append(path.as_ref(), event) {
            error!(error = %e, run_id = %event.run_id, "failed to write event ledger entry");
        }
    }

    fn try_append(path: &Path, event: &Event) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        file.flush()
    }

    /// Read every well-formed event from the ledger, in append order.
    /// A malformed trailing line (a writer crashed mid-append) is skipped
    /// rather than treated as corruption.
    pub fn read_all(path: impl AsRef<Path>) -> std::io::Result<Vec<Event>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path)?;
        let mut events = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    error!(error = %e, "skipping malformed ledger line");
                }
            }
        }
        Ok(events)
    }
}
