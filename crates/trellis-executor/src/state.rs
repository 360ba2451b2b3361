use serde::{Deserialize, Serialize};

/// Scheduling state of a step within a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
  /// Not yet eligible: some inbound edge source is unresolved.
  Pending,
  /// All inbound edges resolved and at least one fired.
  Ready,
  /// Body currently executing.
  Running,
  Completed,
  /// Every inbound guard evaluated false or came from a skipped source.
  Skipped,
  /// The body failed, or an upstream failure propagated here.
  Failed,
}

impl StepState {
  /// Whether downstream steps can resolve their edge from this source.
  pub fn is_resolved(&self) -> bool {
    matches!(
      self,
      StepState::Completed | StepState::Skipped | StepState::Failed
    )
  }

  /// Terminal states never transition again within a run.
  pub fn is_terminal(&self) -> bool {
    self.is_resolved()
  }
}

impl std::fmt::Display for StepState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      StepState::Pending => "pending",
      StepState::Ready => "ready",
      StepState::Running => "running",
      StepState::Completed => "completed",
      StepState::Skipped => "skipped",
      StepState::Failed => "failed",
    };
    f.write_str(name)
  }
}
