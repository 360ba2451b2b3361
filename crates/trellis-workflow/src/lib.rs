//! Trellis Workflow
//!
//! Declarative step graphs with a two-phase lifecycle: a workflow is built
//! through a fluent, cursor-based API (`step` / `then` / `after`), then
//! `commit()` validates the graph and freezes it. Only committed workflows
//! are executable; the scheduler lives in `trellis-executor`.
//!
//! Branching is data-driven: a conditional edge carries a [`Condition`]
//! evaluated against recorded step outputs, with missing or mismatched
//! fields treated as "guard does not fire" rather than an error.

mod condition;
mod edge;
mod error;
mod graph;
mod registry;
mod workflow;

pub use condition::Condition;
pub use edge::{Edge, EdgeSource};
pub use error::{GraphValidationError, WorkflowError};
pub use graph::Graph;
pub use registry::WorkflowRegistry;
pub use workflow::Workflow;
