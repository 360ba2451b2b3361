use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of JSON value a contract field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
  String,
  Boolean,
  Number,
  Object,
  Array,
  /// Accepts any value, including null.
  Any,
}

impl FieldKind {
  fn matches(&self, value: &serde_json::Value) -> bool {
    match self {
      FieldKind::String => value.is_string(),
      FieldKind::Boolean => value.is_boolean(),
      FieldKind::Number => value.is_number(),
      FieldKind::Object => value.is_object(),
      FieldKind::Array => value.is_array(),
      FieldKind::Any => true,
    }
  }
}

impl fmt::Display for FieldKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      FieldKind::String => "string",
      FieldKind::Boolean => "boolean",
      FieldKind::Number => "number",
      FieldKind::Object => "object",
      FieldKind::Array => "array",
      FieldKind::Any => "any",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
  pub kind: FieldKind,
  pub required: bool,
}

/// A flat structural schema over a JSON object payload.
///
/// Contracts describe the expected shape of trigger payloads and step
/// outputs. Validation reports every violating field rather than stopping
/// at the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contract {
  fields: BTreeMap<String, FieldSpec>,
}

impl Contract {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a required field.
  pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
    self.fields.insert(
      name.into(),
      FieldSpec {
        kind,
        required: true,
      },
    );
    self
  }

  /// Add an optional field; when present it must still match the kind.
  pub fn optional_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
    self.fields.insert(
      name.into(),
      FieldSpec {
        kind,
        required: false,
      },
    );
    self
  }

  pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
    self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
  }

  /// Validate a payload against this contract.
  ///
  /// Returns the full list of violations so callers can report every
  /// offending field at once.
  pub fn validate(&self, value: &serde_json::Value) -> Result<(), Vec<FieldViolation>> {
    let Some(object) = value.as_object() else {
      return Err(vec![FieldViolation {
        field: String::new(),
        reason: ViolationReason::NotAnObject,
      }]);
    };

    let mut violations = Vec::new();
    for (name, spec) in &self.fields {
      match object.get(name) {
        Some(field_value) => {
          if !spec.kind.matches(field_value) {
            violations.push(FieldViolation {
              field: name.clone(),
              reason: ViolationReason::WrongKind {
                expected: spec.kind,
              },
            });
          }
        }
        None if spec.required => {
          violations.push(FieldViolation {
            field: name.clone(),
            reason: ViolationReason::Missing,
          });
        }
        None => {}
      }
    }

    if violations.is_empty() {
      Ok(())
    } else {
      Err(violations)
    }
  }
}

/// A single field that failed contract validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
  pub field: String,
  pub reason: ViolationReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ViolationReason {
  Missing,
  WrongKind { expected: FieldKind },
  NotAnObject,
}

impl fmt::Display for FieldViolation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.reason {
      ViolationReason::Missing => write!(f, "field '{}' is missing", self.field),
      ViolationReason::WrongKind { expected } => {
        write!(f, "field '{}' is not a {}", self.field, expected)
      }
      ViolationReason::NotAnObject => write!(f, "payload is not an object"),
    }
  }
}
