//! Trellis Step
//!
//! This crate defines the contract between a workflow and the units of work
//! it schedules. A [`Step`] is a named async body plus optional structural
//! contracts on its input and output. Bodies receive a [`StepContext`] giving
//! read access to the trigger payload, upstream results, and any injected
//! [`Capabilities`].
//!
//! The graph and the scheduler live in `trellis-workflow` and
//! `trellis-executor`; this crate only carries the types both sides agree on.

mod capability;
mod context;
mod contract;
mod error;
mod step;

pub use capability::{
  Capabilities, CapabilitiesBuilder, Generation, GenerationError, TEXT_GENERATION, TextGeneration,
  TextStream,
};
pub use context::StepContext;
pub use contract::{Contract, FieldKind, FieldViolation, ViolationReason};
pub use error::StepError;
pub use step::{Step, StepBody, StepFuture};
