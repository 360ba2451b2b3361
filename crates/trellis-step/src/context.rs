use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::Capabilities;

/// Read-only view handed to a step body by the executor.
///
/// The results snapshot contains only steps that reached `Completed` before
/// this step became ready; the scheduler guarantees a body never observes a
/// result for a step that has not completed.
#[derive(Clone)]
pub struct StepContext {
  execution_id: String,
  step_id: String,
  trigger: Arc<serde_json::Value>,
  input: Arc<serde_json::Value>,
  results: Arc<HashMap<String, serde_json::Value>>,
  capabilities: Capabilities,
}

impl StepContext {
  pub fn new(
    execution_id: impl Into<String>,
    step_id: impl Into<String>,
    trigger: Arc<serde_json::Value>,
    input: serde_json::Value,
    results: Arc<HashMap<String, serde_json::Value>>,
    capabilities: Capabilities,
  ) -> Self {
    Self {
      execution_id: execution_id.into(),
      step_id: step_id.into(),
      trigger,
      input: Arc::new(input),
      results,
      capabilities,
    }
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  pub fn step_id(&self) -> &str {
    &self.step_id
  }

  /// The validated payload that started the run.
  pub fn trigger(&self) -> &serde_json::Value {
    &self.trigger
  }

  /// The step's direct input: the firing predecessor's output, or an object
  /// keyed by predecessor id when several inbound edges fired.
  pub fn input(&self) -> &serde_json::Value {
    &self.input
  }

  /// Output of a previously completed step, if any.
  pub fn step_output(&self, step_id: &str) -> Option<&serde_json::Value> {
    self.results.get(step_id)
  }

  pub fn capabilities(&self) -> &Capabilities {
    &self.capabilities
  }
}
