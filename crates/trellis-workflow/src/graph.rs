use std::collections::{HashMap, HashSet, VecDeque};

use trellis_step::Step;

use crate::edge::{Edge, EdgeSource};
use crate::error::GraphValidationError;

/// Traversal structure over a workflow's steps and edges.
///
/// Edges are referenced by index into the workflow's edge list so that a
/// scheduler can recover each inbound edge's condition, not just its source.
#[derive(Debug, Clone)]
pub struct Graph {
  /// step_id -> indices of edges leaving that step.
  outbound: HashMap<String, Vec<usize>>,
  /// step_id -> indices of edges entering that step.
  inbound: HashMap<String, Vec<usize>>,
  /// Steps reachable directly from the trigger.
  entry_points: Vec<String>,
  /// Steps with multiple inbound edges.
  join_points: HashSet<String>,
}

impl Graph {
  pub fn new(steps: &HashMap<String, Step>, edges: &[Edge]) -> Self {
    let mut outbound: HashMap<String, Vec<usize>> = HashMap::new();
    let mut inbound: HashMap<String, Vec<usize>> = HashMap::new();
    let mut entry_points = Vec::new();

    for step_id in steps.keys() {
      outbound.entry(step_id.clone()).or_default();
      inbound.entry(step_id.clone()).or_default();
    }

    for (index, edge) in edges.iter().enumerate() {
      match &edge.from {
        EdgeSource::Trigger => {
          if !entry_points.contains(&edge.to) {
            entry_points.push(edge.to.clone());
          }
        }
        EdgeSource::Step { step_id } => {
          outbound.entry(step_id.clone()).or_default().push(index);
        }
      }
      inbound.entry(edge.to.clone()).or_default().push(index);
    }

    let join_points: HashSet<String> = inbound
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      outbound,
      inbound,
      entry_points,
      join_points,
    }
  }

  /// Steps with an edge directly from the trigger.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Indices of edges leaving a step.
  pub fn outbound(&self, step_id: &str) -> &[usize] {
    self
      .outbound
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Indices of edges entering a step (including trigger edges).
  pub fn inbound(&self, step_id: &str) -> &[usize] {
    self
      .inbound
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn is_join_point(&self, step_id: &str) -> bool {
    self.join_points.contains(step_id)
  }

  /// Steps with no outgoing edges; their outputs are the run's terminal
  /// output.
  pub fn terminal_steps(&self) -> Vec<&str> {
    self
      .outbound
      .iter()
      .filter(|(_, outgoing)| outgoing.is_empty())
      .map(|(id, _)| id.as_str())
      .collect()
  }

  /// Kahn topological sort over the step graph (trigger excluded). Returns
  /// the sorted order or the id of a step on a cycle.
  pub fn topological_order(&self, edges: &[Edge]) -> Result<Vec<String>, GraphValidationError> {
    let mut in_degree: HashMap<&str, usize> = self
      .inbound
      .keys()
      .map(|id| {
        let degree = self.inbound[id]
          .iter()
          .filter(|&&index| !edges[index].from.is_trigger())
          .count();
        (id.as_str(), degree)
      })
      .collect();

    let mut queue: VecDeque<&str> = in_degree
      .iter()
      .filter(|&(_, &degree)| degree == 0)
      .map(|(&id, _)| id)
      .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(step_id) = queue.pop_front() {
      order.push(step_id.to_string());
      for &index in self.outbound(step_id) {
        let downstream = edges[index].to.as_str();
        let degree = in_degree.get_mut(downstream).expect("edge target known");
        *degree -= 1;
        if *degree == 0 {
          queue.push_back(downstream);
        }
      }
    }

    if order.len() < in_degree.len() {
      let on_cycle = in_degree
        .iter()
        .filter(|&(_, &degree)| degree > 0)
        .map(|(&id, _)| id.to_string())
        .min()
        .unwrap_or_default();
      return Err(GraphValidationError::Cycle(on_cycle));
    }

    Ok(order)
  }

  /// All steps upstream of `step_id`, transitively.
  pub fn ancestors(&self, step_id: &str, edges: &[Edge]) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut pending = vec![step_id.to_string()];

    while let Some(current) = pending.pop() {
      for &index in self.inbound(&current) {
        if let Some(upstream) = edges[index].from.step_id() {
          if seen.insert(upstream.to_string()) {
            pending.push(upstream.to_string());
          }
        }
      }
    }

    seen
  }
}
