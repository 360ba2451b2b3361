use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::state::StepState;

/// Terminal status of a run.
///
/// `Failed` carries the first failing step; the run still drains every
/// independently-ready frontier before reporting, so the results map may
/// contain outputs recorded after the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
  Completed,
  Failed { step_id: String, error: String },
}

/// The observable outcome of one `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
  pub execution_id: String,
  pub status: RunStatus,
  /// Output of every completed step, keyed by step id.
  pub results: HashMap<String, serde_json::Value>,
  /// Outputs of completed steps with no outgoing edges.
  pub terminal_outputs: HashMap<String, serde_json::Value>,
  /// Final scheduling state of every step.
  pub states: HashMap<String, StepState>,
  /// Error detail for every failed step, including propagated failures.
  pub failures: HashMap<String, String>,
}

impl RunResult {
  pub fn is_completed(&self) -> bool {
    matches!(self.status, RunStatus::Completed)
  }

  pub fn output(&self, step_id: &str) -> Option<&serde_json::Value> {
    self.results.get(step_id)
  }

  pub fn state(&self, step_id: &str) -> Option<StepState> {
    self.states.get(step_id).copied()
  }
}
