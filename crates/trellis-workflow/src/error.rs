use thiserror::Error;

/// Lifecycle and construction errors for workflows.
#[derive(Debug, Error)]
pub enum WorkflowError {
  /// A step id was registered twice with a different body.
  #[error("step '{0}' is already registered")]
  DuplicateStep(String),

  /// `then` was called before any step established a cursor.
  #[error("no current step to chain from; register a step first")]
  NoCursor,

  #[error("unknown step '{0}'")]
  UnknownStep(String),

  #[error("malformed condition path '{when}': expected 'stepId.field'")]
  MalformedCondition { when: String },

  /// A builder mutator was called after `commit()`.
  #[error("workflow '{name}' is committed and can no longer be modified")]
  WorkflowFrozen { name: String },

  /// `execute` (or registration) was attempted before `commit()`.
  #[error("workflow '{name}' has not been committed")]
  WorkflowNotCommitted { name: String },

  #[error("workflow '{0}' is already registered")]
  DuplicateWorkflow(String),

  #[error(transparent)]
  Validation(#[from] GraphValidationError),
}

/// Structural problems detected at commit time. These indicate programming
/// errors and are never retried; the workflow never becomes executable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphValidationError {
  #[error("edge references unknown step: from={from}, to={to}")]
  DanglingEdge { from: String, to: String },

  #[error("workflow graph contains a cycle through '{0}'")]
  Cycle(String),

  #[error("step '{0}' is unreachable (no inbound edges)")]
  UnreachableStep(String),

  #[error("workflow has no steps reachable from the trigger")]
  NoEntryPoints,

  #[error("condition on edge '{from}' -> '{to}' references '{step_id}', which is not upstream")]
  ConditionNotUpstream {
    from: String,
    to: String,
    step_id: String,
  },
}
