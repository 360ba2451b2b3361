use trellis_step::{FieldViolation, StepError};

/// Run-level errors that prevent or abort an entire execution.
///
/// Individual step failures are not errors at this level: they are recorded
/// in the run's [`RunResult`](crate::RunResult) so partial results stay
/// available to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  #[error("workflow '{name}' has not been committed")]
  WorkflowNotCommitted { name: String },

  /// The trigger payload failed the workflow's trigger contract; no step
  /// was invoked.
  #[error("invalid trigger payload: {}", format_violations(.violations))]
  InvalidTriggerPayload { violations: Vec<FieldViolation> },

  #[error("execution cancelled")]
  Cancelled,

  #[error("executor task join error: {0}")]
  Join(String),
}

/// Classified failure of a single step invocation.
#[derive(Debug, thiserror::Error)]
pub enum StepFailure {
  #[error("step '{step_id}' requires capability '{capability}', which was not provided")]
  MissingCapability { step_id: String, capability: String },

  #[error("step '{step_id}' input violates its contract: {}", format_violations(.violations))]
  InputContract {
    step_id: String,
    violations: Vec<FieldViolation>,
  },

  #[error("step '{step_id}' output violates its contract: {}", format_violations(.violations))]
  OutputContract {
    step_id: String,
    violations: Vec<FieldViolation>,
  },

  #[error("step '{step_id}' timed out after {timeout_ms}ms")]
  Timeout { step_id: String, timeout_ms: u64 },

  #[error("step '{step_id}' failed: {source}")]
  Execution {
    step_id: String,
    #[source]
    source: StepError,
  },
}

impl StepFailure {
  pub fn step_id(&self) -> &str {
    match self {
      StepFailure::MissingCapability { step_id, .. }
      | StepFailure::InputContract { step_id, .. }
      | StepFailure::OutputContract { step_id, .. }
      | StepFailure::Timeout { step_id, .. }
      | StepFailure::Execution { step_id, .. } => step_id,
    }
  }
}

fn format_violations(violations: &[FieldViolation]) -> String {
  violations
    .iter()
    .map(|violation| violation.to_string())
    .collect::<Vec<_>>()
    .join(", ")
}
