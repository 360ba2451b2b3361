use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Guard controlling whether an edge fires.
///
/// `FieldEquals` reads a dotted path into a named upstream step's recorded
/// output and compares it against an expected literal. Evaluation is
/// fail-closed: a missing step, missing field, or type mismatch means the
/// guard does not fire, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
  Always,
  FieldEquals {
    step_id: String,
    path: String,
    value: serde_json::Value,
  },
}

impl Condition {
  /// Parse a `when` path of the form `stepId.field` (or deeper,
  /// `stepId.field.subfield`) into a field-equality guard.
  pub fn field_equals(when: &str, value: serde_json::Value) -> Result<Self, WorkflowError> {
    match when.split_once('.') {
      Some((step_id, path)) if !step_id.is_empty() && !path.is_empty() => {
        Ok(Condition::FieldEquals {
          step_id: step_id.to_string(),
          path: path.to_string(),
          value,
        })
      }
      _ => Err(WorkflowError::MalformedCondition {
        when: when.to_string(),
      }),
    }
  }

  /// The upstream step this guard reads from, if any.
  pub fn source_step(&self) -> Option<&str> {
    match self {
      Condition::Always => None,
      Condition::FieldEquals { step_id, .. } => Some(step_id),
    }
  }

  /// Evaluate the guard against the recorded results of a run.
  pub fn evaluate(&self, results: &HashMap<String, serde_json::Value>) -> bool {
    match self {
      Condition::Always => true,
      Condition::FieldEquals {
        step_id,
        path,
        value,
      } => results
        .get(step_id)
        .and_then(|output| lookup_path(output, path))
        .is_some_and(|found| found == value),
    }
  }
}

/// Walk a dotted path into a JSON value. Only object fields are traversable;
/// anything else resolves to `None`.
fn lookup_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
  let mut current = value;
  for segment in path.split('.') {
    current = current.as_object()?.get(segment)?;
  }
  Some(current)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn results() -> HashMap<String, serde_json::Value> {
    let mut results = HashMap::new();
    results.insert(
      "gatherCandidateInfo".to_string(),
      json!({
        "candidateName": "Ada",
        "isTechnical": true,
        "assessment": { "score": 90 }
      }),
    );
    results
  }

  #[test]
  fn always_fires() {
    assert!(Condition::Always.evaluate(&HashMap::new()));
  }

  #[test]
  fn parses_step_and_field() {
    let condition = Condition::field_equals("gatherCandidateInfo.isTechnical", json!(true)).unwrap();
    assert_eq!(condition.source_step(), Some("gatherCandidateInfo"));
    assert!(condition.evaluate(&results()));
  }

  #[test]
  fn rejects_path_without_field() {
    assert!(matches!(
      Condition::field_equals("gatherCandidateInfo", json!(true)),
      Err(WorkflowError::MalformedCondition { .. })
    ));
    assert!(matches!(
      Condition::field_equals(".isTechnical", json!(true)),
      Err(WorkflowError::MalformedCondition { .. })
    ));
  }

  #[test]
  fn nested_path_lookup() {
    let condition =
      Condition::field_equals("gatherCandidateInfo.assessment.score", json!(90)).unwrap();
    assert!(condition.evaluate(&results()));
  }

  #[test]
  fn missing_field_is_false_not_error() {
    let condition = Condition::field_equals("gatherCandidateInfo.missing", json!(true)).unwrap();
    assert!(!condition.evaluate(&results()));
  }

  #[test]
  fn missing_step_is_false() {
    let condition = Condition::field_equals("unknownStep.isTechnical", json!(true)).unwrap();
    assert!(!condition.evaluate(&results()));
  }

  #[test]
  fn value_mismatch_is_false() {
    let condition = Condition::field_equals("gatherCandidateInfo.isTechnical", json!(false)).unwrap();
    assert!(!condition.evaluate(&results()));

    // Type mismatch, not just value mismatch.
    let condition =
      Condition::field_equals("gatherCandidateInfo.isTechnical", json!("true")).unwrap();
    assert!(!condition.evaluate(&results()));
  }

  #[test]
  fn path_through_non_object_is_false() {
    let condition =
      Condition::field_equals("gatherCandidateInfo.candidateName.length", json!(3)).unwrap();
    assert!(!condition.evaluate(&results()));
  }
}
