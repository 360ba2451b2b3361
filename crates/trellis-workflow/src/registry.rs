use std::collections::HashMap;
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::workflow::Workflow;

/// An explicit collection of committed workflows, built once at process
/// start and passed by reference to whatever executes them. There is no
/// ambient global registry.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
  workflows: HashMap<String, Arc<Workflow>>,
}

impl WorkflowRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a committed workflow under its name. Uncommitted workflows
  /// are rejected so nothing executable-looking ever holds an unvalidated
  /// graph.
  pub fn register(&mut self, workflow: Workflow) -> Result<(), WorkflowError> {
    if !workflow.is_committed() {
      return Err(WorkflowError::WorkflowNotCommitted {
        name: workflow.name().to_string(),
      });
    }
    let name = workflow.name().to_string();
    if self.workflows.contains_key(&name) {
      return Err(WorkflowError::DuplicateWorkflow(name));
    }
    self.workflows.insert(name, Arc::new(workflow));
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<Arc<Workflow>> {
    self.workflows.get(name).cloned()
  }

  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.workflows.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }

  pub fn len(&self) -> usize {
    self.workflows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.workflows.is_empty()
  }
}
