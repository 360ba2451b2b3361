use crate::capability::GenerationError;

/// Failure raised by a step body.
///
/// Scheduler-level failures (timeouts, missing capabilities, contract
/// violations) are classified by the executor; a body only reports what went
/// wrong inside its own logic.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
  /// A required capability was declared but the body still found it absent.
  #[error("capability '{capability}' not available")]
  MissingCapability { capability: String },

  /// An upstream result the body expected was not recorded.
  #[error("upstream result '{step_id}' not available")]
  UpstreamUnavailable { step_id: String },

  /// Business-logic failure from the body itself.
  #[error("{0}")]
  Failed(String),

  #[error(transparent)]
  Generation(#[from] GenerationError),

  #[error("invalid step output: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl StepError {
  pub fn failed(message: impl Into<String>) -> Self {
    StepError::Failed(message.into())
  }

  pub fn missing_capability(capability: impl Into<String>) -> Self {
    StepError::MissingCapability {
      capability: capability.into(),
    }
  }

  pub fn upstream_unavailable(step_id: impl Into<String>) -> Self {
    StepError::UpstreamUnavailable {
      step_id: step_id.into(),
    }
  }
}
