//! Pattern/Guardrail Registry: loads named execution patterns and enforces
//! them at task boundaries. Patterns are data, not code — pre/post checks
//! are named predicates resolved against a fixed registry.

mod predicates;
mod registry;

pub use predicates::{PrecheckFn, PostcheckFn, PrecheckInput, PostcheckInput};
pub use registry::{PatternRegistry, PatternRegistryError};
