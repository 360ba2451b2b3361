use std::collections::HashMap;
use std::sync::Arc;

use trellis_workflow::Workflow;

use crate::state::StepState;

/// Per-run mutable state: the validated trigger payload, the append-only
/// results map, and each step's scheduling state.
///
/// Created fresh for every `execute` call and moves strictly forward: a
/// recorded result is never overwritten or removed within a run.
pub struct ExecutionContext {
  execution_id: String,
  trigger: Arc<serde_json::Value>,
  results: HashMap<String, serde_json::Value>,
  states: HashMap<String, StepState>,
}

impl ExecutionContext {
  pub fn new(
    execution_id: impl Into<String>,
    trigger: Arc<serde_json::Value>,
    workflow: &Workflow,
  ) -> Self {
    let states = workflow
      .steps()
      .keys()
      .map(|id| (id.clone(), StepState::Pending))
      .collect();

    Self {
      execution_id: execution_id.into(),
      trigger,
      results: HashMap::new(),
      states,
    }
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  pub fn trigger(&self) -> &Arc<serde_json::Value> {
    &self.trigger
  }

  pub fn results(&self) -> &HashMap<String, serde_json::Value> {
    &self.results
  }

  /// Record a completed step's output. Single assignment per key: a result
  /// already present is left untouched.
  pub fn record_result(&mut self, step_id: impl Into<String>, output: serde_json::Value) {
    self.results.entry(step_id.into()).or_insert(output);
  }

  pub fn state(&self, step_id: &str) -> StepState {
    self
      .states
      .get(step_id)
      .copied()
      .unwrap_or(StepState::Pending)
  }

  pub fn set_state(&mut self, step_id: &str, state: StepState) {
    if let Some(current) = self.states.get_mut(step_id) {
      *current = state;
    }
  }

  pub fn states(&self) -> &HashMap<String, StepState> {
    &self.states
  }

  /// The current frontier: steps eligible to run now.
  pub fn ready_steps(&self) -> Vec<String> {
    self
      .states
      .iter()
      .filter(|&(_, &state)| state == StepState::Ready)
      .map(|(id, _)| id.clone())
      .collect()
  }
}
