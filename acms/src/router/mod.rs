//! Router: maps an operation kind to a tool id via a configuration-driven
//! rule table. `fixed` always answers the same tool; `round_robin` cycles
//! a candidate list, with the cursor persisted to disk so restarts don't
//! reset the rotation.

mod counter;
mod strategy;

pub use counter::{RoundRobinCounter, RoundRobinCounterError};
pub use strategy::{RouteRule, Router, RouterConfig, Strategy};
