//! Trellis Executor
//!
//! The scheduler for committed workflows. Each `execute` call creates a
//! fresh [`ExecutionContext`] and walks the graph from the trigger to the
//! terminal steps: pending steps whose inbound edges are all resolved become
//! ready (at least one edge fired), skipped (no guard fired), or failed
//! (an upstream step failed). Ready steps run as concurrent tokio tasks, and
//! each completion immediately resolves and spawns newly-ready dependents, so
//! a slow step never stalls an independent chain. A failure never aborts
//! independent frontiers, it only stops the failed step's dependents.

mod context;
mod error;
mod executor;
mod observer;
mod result;
mod state;

pub use context::ExecutionContext;
pub use error::{ExecutionError, StepFailure};
pub use executor::Executor;
pub use observer::RunObserver;
pub use result::{RunResult, RunStatus};
pub use state::StepState;
