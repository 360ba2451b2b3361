//! An offline, deterministic text-generation client for the demo workflow.
//!
//! Real providers live outside the engine; this one answers recruiting
//! prompts with keyword heuristics so the demo runs without network access.

use futures::StreamExt;
use futures::future::BoxFuture;
use serde_json::json;
use trellis_step::{Contract, FieldKind, Generation, GenerationError, TextGeneration, TextStream};

const TECHNICAL_KEYWORDS: &[&str] = &[
  "engineer",
  "developer",
  "software",
  "programmer",
  "rust",
  "python",
  "backend",
  "frontend",
  "distributed",
  "database",
];

pub struct ScriptedModel;

impl ScriptedModel {
  fn keyword_hits(prompt: &str) -> Vec<&'static str> {
    let haystack = prompt.to_lowercase();
    TECHNICAL_KEYWORDS
      .iter()
      .copied()
      .filter(|keyword| haystack.contains(keyword))
      .collect()
  }

  fn question_for(prompt: &str) -> String {
    if prompt.contains("specialty") || prompt.contains("got into") {
      "How did you first get into your specialty, and what keeps you interested in it?".to_string()
    } else {
      "What interests you most about this role?".to_string()
    }
  }

  /// Synthesize a structured reply field by field. Recognized recruiting
  /// fields get domain heuristics; everything else falls back on its kind.
  fn structured_reply(prompt: &str, contract: &Contract) -> serde_json::Value {
    let hits = Self::keyword_hits(prompt);
    let technical = !hits.is_empty();
    let score = (60 + 5 * hits.len() as u64).min(95);

    let mut object = serde_json::Map::new();
    for (name, spec) in contract.fields() {
      let value = match name {
        "candidateName" => json!("the candidate"),
        "isTechnical" => json!(technical),
        "specialty" => json!(hits.first().copied().unwrap_or("general practice")),
        "technicalScore" | "fitScore" => json!(score),
        "strengths" => json!(hits),
        "weaknesses" => json!(["limited evidence in the resume text"]),
        "notes" => json!("Communicates clearly; likely to adapt well to a collaborative team."),
        "proceed" => json!(score >= 70),
        "reasoning" => json!(format!(
          "Scores around {score}/100 against the role profile based on the resume evidence."
        )),
        "nextSteps" => json!("Schedule a follow-up interview with the hiring manager."),
        _ => match spec.kind {
          FieldKind::String => json!(Self::question_for(prompt)),
          FieldKind::Boolean => json!(technical),
          FieldKind::Number => json!(score),
          FieldKind::Array => json!(hits),
          FieldKind::Object | FieldKind::Any => json!({}),
        },
      };
      object.insert(name.to_string(), value);
    }
    serde_json::Value::Object(object)
  }
}

impl TextGeneration for ScriptedModel {
  fn generate(
    &self,
    prompt: &str,
    output_contract: Option<&Contract>,
  ) -> BoxFuture<'_, Result<Generation, GenerationError>> {
    let text = Self::question_for(prompt);
    let object = output_contract.map(|contract| Self::structured_reply(prompt, contract));
    Box::pin(async move { Ok(Generation { text, object }) })
  }

  fn generate_stream(&self, prompt: &str) -> BoxFuture<'_, Result<TextStream, GenerationError>> {
    let chunks: Vec<Result<String, GenerationError>> = Self::question_for(prompt)
      .split_inclusive(' ')
      .map(|chunk| Ok(chunk.to_string()))
      .collect();
    Box::pin(async move { Ok(futures::stream::iter(chunks).boxed() as TextStream) })
  }
}
