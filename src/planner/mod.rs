//! Planning and execution: diffing declarations against state, and applying
//! the resulting action sequence.

mod diff;
mod executor;
mod plan;

pub use diff::DiffEngine;
pub use executor::{ActionOutcome, ActionResult, ApplyReport, Executor};
pub use plan::{ActionType, Plan, PlanAction, PropertyChange};
