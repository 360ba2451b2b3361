use std::collections::HashMap;

use trellis_step::{Contract, Step};

use crate::condition::Condition;
use crate::edge::{Edge, EdgeSource};
use crate::error::{GraphValidationError, WorkflowError};
use crate::graph::Graph;

/// A named, versionable step graph with a two-phase lifecycle.
///
/// Steps and edges are accumulated through the fluent builder methods, then
/// `commit()` validates the graph and freezes it. The builder tracks a
/// cursor (the most recently referenced step): `then` chains from the
/// cursor, `after` resets it to an already-registered step so a second
/// branch can fan out from the same upstream step.
///
/// Mentioning a step that is already registered (a clone sharing the same
/// body) adds an edge to the existing step instead of re-registering it,
/// which is how two branches converge on a shared downstream step.
#[derive(Clone)]
pub struct Workflow {
  name: String,
  trigger_contract: Option<Contract>,
  steps: HashMap<String, Step>,
  edges: Vec<Edge>,
  cursor: Option<String>,
  attach_from: Option<String>,
  committed: bool,
}

impl Workflow {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      trigger_contract: None,
      steps: HashMap::new(),
      edges: Vec::new(),
      cursor: None,
      attach_from: None,
      committed: false,
    }
  }

  /// Declare the schema the trigger payload must satisfy. Absence means any
  /// payload is accepted.
  pub fn with_trigger_contract(mut self, contract: Contract) -> Self {
    self.trigger_contract = Some(contract);
    self
  }

  /// Register a step. Without a preceding `after`, the step becomes an
  /// entry point reachable directly from the trigger; after `after(x)` it
  /// attaches to `x` instead, starting a new branch.
  pub fn step(&mut self, step: Step) -> Result<&mut Self, WorkflowError> {
    self.attach(step, None)
  }

  /// Like [`step`](Self::step), guarded by a field-equality condition. The
  /// `when` path names an upstream step and a dotted field, e.g.
  /// `"gatherCandidateInfo.isTechnical"`.
  pub fn step_when(
    &mut self,
    step: Step,
    when: &str,
    value: serde_json::Value,
  ) -> Result<&mut Self, WorkflowError> {
    let condition = Condition::field_equals(when, value)?;
    self.attach(step, Some(condition))
  }

  /// Add a sequential edge from the cursor to `step`.
  pub fn then(&mut self, step: Step) -> Result<&mut Self, WorkflowError> {
    self.chain(step, None)
  }

  /// Add a conditional edge from the cursor to `step`.
  pub fn then_when(
    &mut self,
    step: Step,
    when: &str,
    value: serde_json::Value,
  ) -> Result<&mut Self, WorkflowError> {
    let condition = Condition::field_equals(when, value)?;
    self.chain(step, Some(condition))
  }

  /// Reset the cursor to an already-registered step without adding an edge.
  pub fn after(&mut self, step_id: &str) -> Result<&mut Self, WorkflowError> {
    self.ensure_mutable()?;
    if !self.steps.contains_key(step_id) {
      return Err(WorkflowError::UnknownStep(step_id.to_string()));
    }
    self.cursor = Some(step_id.to_string());
    self.attach_from = Some(step_id.to_string());
    Ok(self)
  }

  /// Validate the graph and freeze the workflow. Idempotent: committing an
  /// already-committed workflow is a no-op.
  pub fn commit(&mut self) -> Result<(), WorkflowError> {
    if self.committed {
      return Ok(());
    }
    self.validate()?;
    self.committed = true;
    Ok(())
  }

  fn attach(
    &mut self,
    step: Step,
    condition: Option<Condition>,
  ) -> Result<&mut Self, WorkflowError> {
    self.ensure_mutable()?;
    let from = match self.attach_from.take() {
      Some(step_id) => EdgeSource::step(step_id),
      None => EdgeSource::Trigger,
    };
    self.add_edge(step, from, condition)
  }

  fn chain(
    &mut self,
    step: Step,
    condition: Option<Condition>,
  ) -> Result<&mut Self, WorkflowError> {
    self.ensure_mutable()?;
    self.attach_from = None;
    let from = match &self.cursor {
      Some(step_id) => EdgeSource::step(step_id.clone()),
      None => return Err(WorkflowError::NoCursor),
    };
    self.add_edge(step, from, condition)
  }

  fn add_edge(
    &mut self,
    step: Step,
    from: EdgeSource,
    condition: Option<Condition>,
  ) -> Result<&mut Self, WorkflowError> {
    let step_id = step.id().to_string();
    self.register(step)?;
    let edge = match condition {
      Some(condition) => Edge::conditional(from, step_id.clone(), condition),
      None => Edge::sequential(from, step_id.clone()),
    };
    self.edges.push(edge);
    self.cursor = Some(step_id);
    Ok(self)
  }

  /// Insert a step, or accept a re-reference to one already registered.
  /// Two different steps under one id is a construction error.
  fn register(&mut self, step: Step) -> Result<(), WorkflowError> {
    match self.steps.get(step.id()) {
      Some(existing) if existing.same_body(&step) => Ok(()),
      Some(_) => Err(WorkflowError::DuplicateStep(step.id().to_string())),
      None => {
        self.steps.insert(step.id().to_string(), step);
        Ok(())
      }
    }
  }

  fn ensure_mutable(&self) -> Result<(), WorkflowError> {
    if self.committed {
      return Err(WorkflowError::WorkflowFrozen {
        name: self.name.clone(),
      });
    }
    Ok(())
  }

  fn validate(&self) -> Result<(), GraphValidationError> {
    let graph = self.graph();

    for edge in &self.edges {
      let from_known = match &edge.from {
        EdgeSource::Trigger => true,
        EdgeSource::Step { step_id } => self.steps.contains_key(step_id),
      };
      if !from_known || !self.steps.contains_key(&edge.to) {
        return Err(GraphValidationError::DanglingEdge {
          from: edge.from.to_string(),
          to: edge.to.clone(),
        });
      }
    }

    if graph.entry_points().is_empty() {
      return Err(GraphValidationError::NoEntryPoints);
    }

    for step_id in self.steps.keys() {
      if graph.inbound(step_id).is_empty() {
        return Err(GraphValidationError::UnreachableStep(step_id.clone()));
      }
    }

    graph.topological_order(&self.edges)?;

    for edge in &self.edges {
      let Some(condition_source) = edge.condition.source_step() else {
        continue;
      };
      let upstream_ok = match edge.from.step_id() {
        Some(from_id) => {
          condition_source == from_id
            || graph
              .ancestors(from_id, &self.edges)
              .contains(condition_source)
        }
        // A guard on a trigger edge has no upstream output to read.
        None => false,
      };
      if !self.steps.contains_key(condition_source) || !upstream_ok {
        return Err(GraphValidationError::ConditionNotUpstream {
          from: edge.from.to_string(),
          to: edge.to.clone(),
          step_id: condition_source.to_string(),
        });
      }
    }

    Ok(())
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_committed(&self) -> bool {
    self.committed
  }

  pub fn trigger_contract(&self) -> Option<&Contract> {
    self.trigger_contract.as_ref()
  }

  pub fn get_step(&self, step_id: &str) -> Option<&Step> {
    self.steps.get(step_id)
  }

  pub fn steps(&self) -> &HashMap<String, Step> {
    &self.steps
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  /// Build the traversal structure for this workflow.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.steps, &self.edges)
  }
}

impl std::fmt::Debug for Workflow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Workflow")
      .field("name", &self.name)
      .field("steps", &self.steps.len())
      .field("edges", &self.edges.len())
      .field("committed", &self.committed)
      .finish()
  }
}
