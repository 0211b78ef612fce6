//! Run supervisor: polls the state store for non-terminal runs, acquires a
//! best-effort per-run advisory lock, and spawns a child process to drive
//! each one through the orchestrator. This is the daemon's execution loop,
//! layered on top of [`super::DaemonManager`]'s process lifecycle.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fs2::FileExt;
use statestore::Store;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::Run;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("state store error: {0}")]
    Store(#[from] statestore::StoreError),
}

/// Best-effort per-run advisory lock via `fs2`. Two supervisor processes
/// (e.g. during a restart race) polling the same store will not both spawn
/// a run: the loser's `try_lock_exclusive` fails immediately and it moves
/// on to the next candidate.
struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    fn try_acquire(lock_dir: &Path, run_id: &str) -> Option<Self> {
        if let Err(e) = fs::create_dir_all(lock_dir) {
            warn!(?e, ?lock_dir, "failed to create run lock directory");
            return None;
        }
        let path = lock_dir.join(format!("{run_id}.lock"));
        let file = match fs::OpenOptions::new().create(true).write(true).open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(?e, run_id, "failed to open run lock file");
                return None;
            }
        };
        match file.try_lock_exclusive() {
            Ok(()) => Some(Self { file, path }),
            Err(_) => None,
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

struct InFlight {
    child: Child,
    _lock: RunLock,
}

/// Polls the state store for runs whose phase is not terminal, claims each
/// with a [`RunLock`], and spawns one child process per run up to
/// `max_concurrent_runs`. Reaps finished children on every tick.
pub struct RunSupervisor {
    store: Store,
    lock_dir: PathBuf,
    exe: PathBuf,
    run_args: Vec<String>,
    poll_interval: Duration,
    max_concurrent_runs: u32,
    in_flight: HashMap<String, InFlight>,
}

impl RunSupervisor {
    pub fn new(store: Store, lock_dir: impl Into<PathBuf>, poll_interval: Duration, max_concurrent_runs: u32) -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        Ok(Self {
            store,
            lock_dir: lock_dir.into(),
            exe,
            run_args: vec!["run".to_string(), "--run-id".to_string()],
            poll_interval,
            max_concurrent_runs,
            in_flight: HashMap::new(),
        })
    }

    /// Runs the poll loop until `shutdown` is set. Each tick reaps finished
    /// children, then claims and spawns as many queued runs as the
    /// concurrency cap allows. Returns once `shutdown` is observed; does
    /// not wait for in-flight children to exit.
    pub async fn run(&mut self, shutdown: &AtomicBool) -> Result<(), SupervisorError> {
        loop {
            self.reap_finished();

            if shutdown.load(Ordering::SeqCst) {
                info!(in_flight = self.in_flight.len(), "shutdown observed, leaving in-flight runs to their own supervisors");
                break;
            }

            self.claim_and_spawn()?;
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    fn reap_finished(&mut self) {
        let finished: Vec<String> = self
            .in_flight
            .iter_mut()
            .filter_map(|(run_id, inflight)| match inflight.child.try_wait() {
                Ok(Some(_status)) => Some(run_id.clone()),
                Ok(None) => None,
                Err(e) => {
                    warn!(?e, run_id, "failed to poll child run process");
                    None
                }
            })
            .collect();
        for run_id in finished {
            info!(run_id, "run process exited");
            self.in_flight.remove(&run_id);
        }
    }

    fn claim_and_spawn(&mut self) -> Result<(), SupervisorError> {
        if self.in_flight.len() as u32 >= self.max_concurrent_runs {
            return Ok(());
        }

        let capacity = self.max_concurrent_runs as usize - self.in_flight.len();
        let runs: Vec<Run> = self.store.list(&[])?;
        let candidates: Vec<Run> =
            runs.into_iter().filter(|r| !r.is_terminal()).filter(|r| !self.in_flight.contains_key(&r.id)).take(capacity).collect();

        for run in candidates {
            let Some(lock) = RunLock::try_acquire(&self.lock_dir, &run.id) else {
                // Another supervisor process already owns this run.
                continue;
            };
            match self.spawn(&run.id) {
                Ok(child) => {
                    info!(run_id = %run.id, pid = child.id(), "spawned run process");
                    self.in_flight.insert(run.id.clone(), InFlight { child, _lock: lock });
                }
                Err(e) => warn!(run_id = %run.id, ?e, "failed to spawn run process"),
            }
        }
        Ok(())
    }

    fn spawn(&self, run_id: &str) -> std::io::Result<Child> {
        Command::new(&self.exe).args(&self.run_args).arg(run_id).stdin(Stdio::null()).spawn()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_supervisor(store: Store, lock_dir: PathBuf, max_concurrent_runs: u32) -> RunSupervisor {
        let mut sup = RunSupervisor::new(store, lock_dir, Duration::from_millis(10), max_concurrent_runs).unwrap();
        // Override the child command so tests don't re-exec the test binary.
        sup.exe = PathBuf::from("echo");
        sup.run_args = vec!["run-id".to_string()];
        sup
    }

    #[test]
    fn lock_prevents_concurrent_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let first = RunLock::try_acquire(dir.path(), "run-1");
        assert!(first.is_some());
        let second = RunLock::try_acquire(dir.path(), "run-1");
        assert!(second.is_none());
        drop(first);
        let third = RunLock::try_acquire(dir.path(), "run-1");
        assert!(third.is_some());
    }

    #[test]
    fn different_runs_have_independent_locks() {
        let dir = tempfile::tempdir().unwrap();
        let a = RunLock::try_acquire(dir.path(), "run-a");
        let b = RunLock::try_acquire(dir.path(), "run-b");
        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn claim_and_spawn_respects_concurrency_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("store.sqlite")).unwrap();
        for _ in 0..3 {
            let run = Run::new(dir.path().to_str().unwrap(), serde_json::json!({}));
            store.create(&run).unwrap();
        }

        let mut sup = test_supervisor(store, dir.path().join("locks"), 2);
        sup.claim_and_spawn().unwrap();

        assert_eq!(sup.in_flight_count(), 2);
    }

    #[tokio::test]
    async fn terminal_runs_are_never_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("store.sqlite")).unwrap();
        let mut run = Run::new(dir.path().to_str().unwrap(), serde_json::json!({}));
        run.transition(crate::domain::Phase::GapAnalysis);
        run.transition(crate::domain::Phase::Planning);
        run.transition(crate::domain::Phase::Execution);
        run.transition(crate::domain::Phase::Summary);
        run.transition(crate::domain::Phase::Done);
        store.create(&run).unwrap();

        let mut sup = test_supervisor(store, dir.path().join("locks"), 4);
        sup.claim_and_spawn().unwrap();

        assert_eq!(sup.in_flight_count(), 0);
    }
}
