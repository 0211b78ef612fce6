//! Executor: drives the per-task pipeline (pattern resolve -> guardrail
//! pre -> router -> resilient tool run -> guardrail post -> persist +
//! event) over a bounded worker pool.

mod pipeline;

pub use pipeline::{Executor, ExecutorConfig, TaskOutcome};
