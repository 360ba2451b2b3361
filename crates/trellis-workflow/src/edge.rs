use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// The origin of an edge: either a registered step or the trigger sentinel
/// representing the workflow's external input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeSource {
  Trigger,
  Step { step_id: String },
}

impl EdgeSource {
  pub fn step(step_id: impl Into<String>) -> Self {
    EdgeSource::Step {
      step_id: step_id.into(),
    }
  }

  pub fn step_id(&self) -> Option<&str> {
    match self {
      EdgeSource::Trigger => None,
      EdgeSource::Step { step_id } => Some(step_id),
    }
  }

  pub fn is_trigger(&self) -> bool {
    matches!(self, EdgeSource::Trigger)
  }
}

impl std::fmt::Display for EdgeSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EdgeSource::Trigger => f.write_str("trigger"),
      EdgeSource::Step { step_id } => f.write_str(step_id),
    }
  }
}

/// A directed edge in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
  pub from: EdgeSource,
  pub to: String,
  pub condition: Condition,
}

impl Edge {
  pub fn sequential(from: EdgeSource, to: impl Into<String>) -> Self {
    Self {
      from,
      to: to.into(),
      condition: Condition::Always,
    }
  }

  pub fn conditional(from: EdgeSource, to: impl Into<String>, condition: Condition) -> Self {
    Self {
      from,
      to: to.into(),
      condition,
    }
  }

  pub fn is_conditional(&self) -> bool {
    !matches!(self.condition, Condition::Always)
  }
}
