use statestore::Store;
use thiserror::Error;

use crate::domain::{Patch, PatchStatus, PatchTransition};
use statestore::now_ms;

use super::transitions::is_allowed_transition;

#[derive(Debug, Error)]
pub enum PatchLedgerError {
    #[error("invalid patch transition {from} -> {to}")]
    InvalidTransition { from: PatchStatus, to: PatchStatus },

    #[error("store error: {0}")]
    Store(#[from] statestore::StoreError),
}

/// Applies and persists patch transitions, rejecting any edge not in the
/// allowed-transition table. No silent corrections: a rejected transition
/// leaves the patch untouched.
pub struct PatchLedger<'s> {
    store: &'s Store,
}

impl<'s> PatchLedger<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn create(&self, patch: &Patch) -> Result<(), PatchLedgerError> {
        self.store.create(patch)?;
        Ok(())
    }

    /// Validate the transition, append it to history, persist the updated
    /// patch. Returns the rejected transition as a structured error without
    /// mutating `patch` when invalid.
    pub fn transition(&self, patch: &mut Patch, to: PatchStatus, actor: Option<String>) -> Result<(), PatchLedgerError> {
        let from = patch.status();
        if !is_allowed_transition(from, to) {
            return Err(PatchLedgerError::InvalidTransition { from, to });
        }

        patch.history.push(PatchTransition { from, to, at: now_ms(), actor });
        patch.status = to;
        patch.updated_at = now_ms();
        self.store.update(patch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path: PathBuf = dir.path().join("store.sqlite");
        (Store::open(&db_path).unwrap(), dir)
    }

    #[test]
    fn valid_transition_updates_status_and_history() {
        let (store, _dir) = store();
        let ledger = PatchLedger::new(&store);
        let mut patch = Patch::new("run-1", "task-1");
        ledger.create(&patch).unwrap();

        ledger.transition(&mut patch, PatchStatus::Validated, None).unwrap();
        assert_eq!(patch.status(), PatchStatus::Validated);
        assert_eq!(patch.history.len(), 1);
        assert_eq!(patch.history[0].from, PatchStatus::Created);
        assert_eq!(patch.history[0].to, PatchStatus::Validated);

        let reloaded: Patch = store.get(&patch.id).unwrap();
        assert_eq!(reloaded.status(), PatchStatus::Validated);
    }

    #[test]
    fn invalid_transition_is_rejected_and_patch_unchanged() {
        let (store, _dir) = store();
        let ledger = PatchLedger::new(&store);
        let mut patch = Patch::new("run-1", "task-1");
        ledger.create(&patch).unwrap();

        let err = ledger.transition(&mut patch, PatchStatus::Committed, None).unwrap_err();
        assert!(matches!(err, PatchLedgerError::InvalidTransition { .. }));
        assert_eq!(patch.status(), PatchStatus::Created);
        assert!(patch.history.is_empty());
    }

    #[test]
    fn quarantine_from_non_terminal_succeeds() {
        let (store, _dir) = store();
        let ledger = PatchLedger::new(&store);
        let mut patch = Patch::new("run-1", "task-1");
        ledger.create(&patch).unwrap();

        ledger.transition(&mut patch, PatchStatus::Quarantined, Some("policy".to_string())).unwrap();
        assert_eq!(patch.status(), PatchStatus::Quarantined);
        assert_eq!(patch.history[0].actor.as_deref(), Some("policy"));
    }
}
