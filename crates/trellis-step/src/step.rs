use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::StepContext;
use crate::contract::Contract;
use crate::error::StepError;

pub type StepFuture = BoxFuture<'static, Result<serde_json::Value, StepError>>;

/// An executable step body.
///
/// Implemented for free by any `Fn(StepContext) -> impl Future` closure, so
/// most callers never name this trait.
pub trait StepBody: Send + Sync {
  fn run(&self, ctx: StepContext) -> StepFuture;
}

impl<F, Fut> StepBody for F
where
  F: Fn(StepContext) -> Fut + Send + Sync,
  Fut: Future<Output = Result<serde_json::Value, StepError>> + Send + 'static,
{
  fn run(&self, ctx: StepContext) -> StepFuture {
    Box::pin(self(ctx))
  }
}

/// A named unit of work with declared contracts and a single async body.
///
/// Cloning a step is cheap and preserves body identity: two clones of the
/// same step share the same underlying body, which is how the builder tells
/// a re-reference apart from an accidental id collision.
#[derive(Clone)]
pub struct Step {
  id: String,
  input_contract: Option<Contract>,
  output_contract: Option<Contract>,
  requires: Vec<String>,
  timeout_ms: Option<u64>,
  body: Arc<dyn StepBody>,
}

impl Step {
  pub fn new(id: impl Into<String>, body: impl StepBody + 'static) -> Self {
    Self {
      id: id.into(),
      input_contract: None,
      output_contract: None,
      requires: Vec::new(),
      timeout_ms: None,
      body: Arc::new(body),
    }
  }

  /// Declare the expected shape of the step's direct input.
  pub fn input_contract(mut self, contract: Contract) -> Self {
    self.input_contract = Some(contract);
    self
  }

  /// Declare the expected shape of the step's output. The executor validates
  /// the recorded output against it; a mismatch fails the step.
  pub fn output_contract(mut self, contract: Contract) -> Self {
    self.output_contract = Some(contract);
    self
  }

  /// Declare a capability the body needs. Absence at execution time fails
  /// the step before the body runs.
  pub fn requires(mut self, capability: impl Into<String>) -> Self {
    self.requires.push(capability.into());
    self
  }

  /// Per-invocation deadline in milliseconds.
  pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn declared_input_contract(&self) -> Option<&Contract> {
    self.input_contract.as_ref()
  }

  pub fn declared_output_contract(&self) -> Option<&Contract> {
    self.output_contract.as_ref()
  }

  pub fn required_capabilities(&self) -> &[String] {
    &self.requires
  }

  pub fn timeout(&self) -> Option<u64> {
    self.timeout_ms
  }

  pub fn body(&self) -> &Arc<dyn StepBody> {
    &self.body
  }

  /// Whether two step values refer to the same underlying body.
  pub fn same_body(&self, other: &Step) -> bool {
    Arc::ptr_eq(&self.body, &other.body)
  }
}

impl fmt::Debug for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Step")
      .field("id", &self.id)
      .field("input_contract", &self.input_contract)
      .field("output_contract", &self.output_contract)
      .field("requires", &self.requires)
      .field("timeout_ms", &self.timeout_ms)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::sync::Arc;

  use serde_json::json;

  use super::*;
  use crate::Capabilities;

  fn ctx(step_id: &str) -> StepContext {
    StepContext::new(
      "exec-1",
      step_id,
      Arc::new(json!({ "resumeText": "text" })),
      json!(null),
      Arc::new(HashMap::new()),
      Capabilities::empty(),
    )
  }

  #[tokio::test]
  async fn closures_are_step_bodies() {
    let step = Step::new("double", |ctx: StepContext| async move {
      let n = ctx.input().as_u64().unwrap_or(0);
      Ok(json!({ "doubled": n * 2 }))
    });

    let context = StepContext::new(
      "exec-1",
      "double",
      Arc::new(json!({})),
      json!(21),
      Arc::new(HashMap::new()),
      Capabilities::empty(),
    );

    let output = step.body().run(context).await.unwrap();
    assert_eq!(output, json!({ "doubled": 42 }));
  }

  #[tokio::test]
  async fn body_reads_trigger_payload() {
    let step = Step::new("echo", |ctx: StepContext| async move {
      Ok(ctx.trigger().clone())
    });

    let output = step.body().run(ctx("echo")).await.unwrap();
    assert_eq!(output, json!({ "resumeText": "text" }));
  }

  #[test]
  fn clones_share_body_identity() {
    let step = Step::new("a", |_ctx: StepContext| async { Ok(json!(1)) });
    let other = Step::new("a", |_ctx: StepContext| async { Ok(json!(1)) });
    let clone = step.clone();

    assert!(step.same_body(&clone));
    assert!(!step.same_body(&other));
  }
}
