//! Scheduler: a dependency-DAG task manager. Identifies ready tasks,
//! enforces topological ordering, exposes batches for parallel dispatch.

mod dag;

pub use dag::{Scheduler, SchedulerError};
