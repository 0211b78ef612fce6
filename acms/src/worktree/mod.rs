//! Git worktree management
//!
//! Each workstream executes in its own git worktree on a feature branch,
//! isolating its tasks' file changes from every other workstream's.

mod manager;

pub use manager::{WorktreeConfig, WorktreeError, WorktreeInfo, WorktreeManager};
