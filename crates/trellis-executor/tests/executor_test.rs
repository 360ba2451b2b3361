//! Integration tests for the scheduler: branching, skip and failure
//! propagation, capabilities, timeouts, and observer hooks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use trellis_executor::{ExecutionError, Executor, RunObserver, RunStatus, StepState};
use trellis_step::{
  Capabilities, Contract, FieldKind, Generation, GenerationError, Step, StepContext, StepError,
  TextGeneration, TextStream,
};
use trellis_workflow::Workflow;

/// A step that records how often it ran and returns a fixed output.
fn counted(id: &str, output: serde_json::Value, counter: Arc<AtomicUsize>) -> Step {
  Step::new(id, move |_ctx: StepContext| {
    let output = output.clone();
    let counter = counter.clone();
    async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(output)
    }
  })
}

fn lit(id: &str, output: serde_json::Value) -> Step {
  counted(id, output, Arc::new(AtomicUsize::new(0)))
}

fn executor() -> Executor {
  Executor::new(Capabilities::empty())
}

/// The candidate-screening shape: one entry step fanning out into a
/// technical and a non-technical branch that converge on shared steps.
///
/// Every body asserts its upstream dependencies are present in the results
/// map before producing output.
fn screening_workflow(counters: &ScreeningCounters) -> Workflow {
  let gather = Step::new("gather", {
    let counter = counters.gather.clone();
    move |ctx: StepContext| {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        let resume = ctx
          .trigger()
          .get("resumeText")
          .and_then(|v| v.as_str())
          .ok_or_else(|| StepError::failed("trigger payload missing resumeText"))?;
        Ok(json!({
          "candidateName": "Ada",
          "isTechnical": resume.contains("engineer"),
          "specialty": "distributed systems",
          "resumeText": resume,
        }))
      }
    }
  });

  let ask_specialty = dependent_step("askAboutSpecialty", &["gather"], &counters.ask_specialty);
  let evaluate = dependent_step(
    "evaluateTechnicalSkills",
    &["gather", "askAboutSpecialty"],
    &counters.evaluate,
  );
  let assess = dependent_step("assessCulturalFit", &["gather"], &counters.assess);
  let recommend = dependent_step("makeRecommendation", &["assessCulturalFit"], &counters.recommend);
  let ask_role = dependent_step("askAboutRole", &["gather"], &counters.ask_role);

  let mut workflow = Workflow::new("candidate-screening")
    .with_trigger_contract(Contract::new().field("resumeText", FieldKind::String));
  workflow
    .step(gather)
    .unwrap()
    .then_when(ask_specialty, "gather.isTechnical", json!(true))
    .unwrap()
    .then(evaluate)
    .unwrap()
    .then(assess.clone())
    .unwrap()
    .then(recommend.clone())
    .unwrap()
    .after("gather")
    .unwrap()
    .step_when(ask_role, "gather.isTechnical", json!(false))
    .unwrap()
    .then(assess.clone())
    .unwrap()
    .then(recommend.clone())
    .unwrap();
  workflow.commit().unwrap();
  workflow
}

/// A step that fails with `StepError` if any named dependency is missing
/// from its context, verifying the scheduler never runs a step before its
/// inbound edges resolved.
fn dependent_step(id: &str, depends_on: &[&str], counter: &Arc<AtomicUsize>) -> Step {
  let depends_on: Vec<String> = depends_on.iter().map(|s| s.to_string()).collect();
  let counter = counter.clone();
  let step_id = id.to_string();
  Step::new(id, move |ctx: StepContext| {
    let depends_on = depends_on.clone();
    let counter = counter.clone();
    let step_id = step_id.clone();
    async move {
      counter.fetch_add(1, Ordering::SeqCst);
      for dependency in &depends_on {
        if ctx.step_output(dependency).is_none() {
          return Err(StepError::upstream_unavailable(dependency));
        }
      }
      Ok(json!({ "from": step_id }))
    }
  })
}

#[derive(Default)]
struct ScreeningCounters {
  gather: Arc<AtomicUsize>,
  ask_specialty: Arc<AtomicUsize>,
  evaluate: Arc<AtomicUsize>,
  assess: Arc<AtomicUsize>,
  recommend: Arc<AtomicUsize>,
  ask_role: Arc<AtomicUsize>,
}

#[tokio::test]
async fn scenario_a_technical_branch_runs_and_role_branch_skips() {
  let counters = ScreeningCounters::default();
  let workflow = screening_workflow(&counters);

  let result = executor()
    .execute(
      &workflow,
      json!({ "resumeText": "senior software engineer, rust" }),
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert!(result.is_completed());
  assert_eq!(result.state("askAboutSpecialty"), Some(StepState::Completed));
  assert_eq!(result.state("evaluateTechnicalSkills"), Some(StepState::Completed));
  assert_eq!(result.state("assessCulturalFit"), Some(StepState::Completed));
  assert_eq!(result.state("makeRecommendation"), Some(StepState::Completed));
  assert_eq!(result.state("askAboutRole"), Some(StepState::Skipped));

  assert_eq!(counters.ask_specialty.load(Ordering::SeqCst), 1);
  assert_eq!(counters.ask_role.load(Ordering::SeqCst), 0);

  // The terminal step's output is part of the run's observable output.
  assert_eq!(
    result.terminal_outputs.get("makeRecommendation"),
    Some(&json!({ "from": "makeRecommendation" }))
  );
}

#[tokio::test]
async fn scenario_b_non_technical_branch_runs_inverse() {
  let counters = ScreeningCounters::default();
  let workflow = screening_workflow(&counters);

  let result = executor()
    .execute(
      &workflow,
      json!({ "resumeText": "event planner and project manager" }),
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert!(result.is_completed());
  assert_eq!(result.state("askAboutRole"), Some(StepState::Completed));
  assert_eq!(result.state("askAboutSpecialty"), Some(StepState::Skipped));
  assert_eq!(result.state("evaluateTechnicalSkills"), Some(StepState::Skipped));
  // The shared tail still completes through the role branch.
  assert_eq!(result.state("assessCulturalFit"), Some(StepState::Completed));
  assert_eq!(result.state("makeRecommendation"), Some(StepState::Completed));

  assert_eq!(counters.ask_specialty.load(Ordering::SeqCst), 0);
  assert_eq!(counters.evaluate.load(Ordering::SeqCst), 0);
  assert_eq!(counters.recommend.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_c_invalid_trigger_runs_no_step() {
  let counters = ScreeningCounters::default();
  let workflow = screening_workflow(&counters);

  let result = executor()
    .execute(&workflow, json!({ "resume": "wrong field" }), CancellationToken::new())
    .await;

  match result {
    Err(ExecutionError::InvalidTriggerPayload { violations }) => {
      assert!(violations.iter().any(|v| v.field == "resumeText"));
    }
    other => panic!("expected InvalidTriggerPayload, got {other:?}"),
  }

  assert_eq!(counters.gather.load(Ordering::SeqCst), 0);
  assert_eq!(counters.assess.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_d_failure_spares_independent_branch() {
  let ran_c = Arc::new(AtomicUsize::new(0));
  let ran_x = Arc::new(AtomicUsize::new(0));

  let failing = Step::new("b", |_ctx: StepContext| async {
    Err::<serde_json::Value, _>(StepError::failed("upstream service unavailable"))
  });

  let mut workflow = Workflow::new("partial-failure");
  workflow
    .step(lit("a", json!({ "ok": true })))
    .unwrap()
    .then(failing)
    .unwrap()
    .then(counted("c", json!({}), ran_c.clone()))
    .unwrap()
    .step(counted("x", json!({ "independent": true }), ran_x.clone()))
    .unwrap();
  workflow.commit().unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  match &result.status {
    RunStatus::Failed { step_id, error } => {
      assert_eq!(step_id, "b");
      assert!(error.contains("upstream service unavailable"));
    }
    RunStatus::Completed => panic!("run should have failed"),
  }

  // Dependents of the failure never run; the sibling branch completes.
  assert_eq!(result.state("c"), Some(StepState::Failed));
  assert_eq!(ran_c.load(Ordering::SeqCst), 0);
  assert_eq!(result.state("x"), Some(StepState::Completed));
  assert_eq!(ran_x.load(Ordering::SeqCst), 1);

  // Partial results stay available for diagnostics.
  assert_eq!(result.output("a"), Some(&json!({ "ok": true })));
  assert!(result.failures.contains_key("b"));
  assert!(result.failures["c"].contains("upstream step 'b' failed"));
}

#[tokio::test]
async fn skip_propagates_down_an_exclusive_chain() {
  let ran_tail = Arc::new(AtomicUsize::new(0));

  let mut workflow = Workflow::new("skip-chain");
  workflow
    .step(lit("gate", json!({ "open": false })))
    .unwrap()
    .then_when(lit("first", json!({})), "gate.open", json!(true))
    .unwrap()
    .then(lit("second", json!({})))
    .unwrap()
    .then(counted("third", json!({}), ran_tail.clone()))
    .unwrap();
  workflow.commit().unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  assert!(result.is_completed());
  assert_eq!(result.state("first"), Some(StepState::Skipped));
  assert_eq!(result.state("second"), Some(StepState::Skipped));
  assert_eq!(result.state("third"), Some(StepState::Skipped));
  assert_eq!(ran_tail.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fan_out_chains_resolve_independently() {
  // Overlapping guards: both branches fire from the same upstream output.
  let mut workflow = Workflow::new("fan-out");
  workflow
    .step(lit("source", json!({ "flag": true, "count": 2 })))
    .unwrap()
    .then_when(lit("left", json!({ "branch": "left" })), "source.flag", json!(true))
    .unwrap()
    .after("source")
    .unwrap()
    .step_when(lit("right", json!({ "branch": "right" })), "source.count", json!(2))
    .unwrap();
  workflow.commit().unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  assert!(result.is_completed());
  assert_eq!(result.state("left"), Some(StepState::Completed));
  assert_eq!(result.state("right"), Some(StepState::Completed));
  // Both are terminal steps of their own frontier.
  assert_eq!(result.terminal_outputs.len(), 2);
}

#[tokio::test]
async fn slow_sibling_does_not_stall_an_independent_chain() {
  // Two independent chains: fast -> fast_child, and slow. fast_child
  // becomes ready as soon as fast completes and must run while slow is
  // still sleeping.
  let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

  let fast = Step::new("fast", |_ctx: StepContext| async {
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    Ok(json!({}))
  });
  let fast_child = Step::new("fast_child", {
    let events = events.clone();
    move |_ctx: StepContext| {
      let events = events.clone();
      async move {
        events.lock().unwrap().push("fast_child");
        Ok(json!({}))
      }
    }
  });
  let slow = Step::new("slow", {
    let events = events.clone();
    move |_ctx: StepContext| {
      let events = events.clone();
      async move {
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        events.lock().unwrap().push("slow");
        Ok(json!({}))
      }
    }
  });

  let mut workflow = Workflow::new("independent-chains");
  workflow
    .step(fast)
    .unwrap()
    .then(fast_child)
    .unwrap()
    .step(slow)
    .unwrap();
  workflow.commit().unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  assert!(result.is_completed());
  assert_eq!(*events.lock().unwrap(), vec!["fast_child", "slow"]);
}

#[tokio::test]
async fn diamond_join_sees_both_upstream_results() {
  let join = Step::new("join", |ctx: StepContext| async move {
    let left = ctx
      .step_output("left")
      .cloned()
      .ok_or_else(|| StepError::upstream_unavailable("left"))?;
    let right = ctx
      .step_output("right")
      .cloned()
      .ok_or_else(|| StepError::upstream_unavailable("right"))?;
    Ok(json!({ "left": left, "right": right, "input": ctx.input().clone() }))
  });

  let mut workflow = Workflow::new("diamond");
  workflow
    .step(lit("head", json!({})))
    .unwrap()
    .then(lit("left", json!({ "n": 1 })))
    .unwrap()
    .then(join.clone())
    .unwrap()
    .after("head")
    .unwrap()
    .step(lit("right", json!({ "n": 2 })))
    .unwrap()
    .then(join.clone())
    .unwrap();
  workflow.commit().unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  assert!(result.is_completed());
  let output = result.output("join").unwrap();
  assert_eq!(output["left"], json!({ "n": 1 }));
  assert_eq!(output["right"], json!({ "n": 2 }));
  // Two fired inbound edges produce an object input keyed by source.
  assert_eq!(output["input"]["left"], json!({ "n": 1 }));
  assert_eq!(output["input"]["right"], json!({ "n": 2 }));
}

#[tokio::test]
async fn uncommitted_workflow_is_rejected() {
  let mut workflow = Workflow::new("draft");
  workflow.step(lit("a", json!({}))).unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await;
  assert!(matches!(
    result,
    Err(ExecutionError::WorkflowNotCommitted { .. })
  ));
}

#[tokio::test]
async fn step_timeout_is_a_step_failure() {
  let slow = Step::new("slow", |_ctx: StepContext| async {
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    Ok(json!({}))
  })
  .timeout_ms(20);

  let mut workflow = Workflow::new("deadline");
  workflow.step(slow).unwrap();
  workflow.commit().unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  match &result.status {
    RunStatus::Failed { step_id, error } => {
      assert_eq!(step_id, "slow");
      assert!(error.contains("timed out after 20ms"));
    }
    RunStatus::Completed => panic!("run should have failed"),
  }
}

#[tokio::test]
async fn missing_capability_fails_before_body_runs() {
  let ran = Arc::new(AtomicUsize::new(0));
  let step = counted("model-step", json!({}), ran.clone()).requires("text-generation");

  let mut workflow = Workflow::new("needs-model");
  workflow.step(step).unwrap();
  workflow.commit().unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  match &result.status {
    RunStatus::Failed { step_id, error } => {
      assert_eq!(step_id, "model-step");
      assert!(error.contains("text-generation"));
    }
    RunStatus::Completed => panic!("run should have failed"),
  }
  assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn declared_output_contract_is_enforced() {
  let step = Step::new("shaped", |_ctx: StepContext| async {
    Ok(json!({ "question": 42 }))
  })
  .output_contract(Contract::new().field("question", FieldKind::String));

  let mut workflow = Workflow::new("contract-check");
  workflow.step(step).unwrap();
  workflow.commit().unwrap();

  let result = executor()
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  match &result.status {
    RunStatus::Failed { step_id, error } => {
      assert_eq!(step_id, "shaped");
      assert!(error.contains("question"));
    }
    RunStatus::Completed => panic!("run should have failed"),
  }
  // The malformed output is not recorded.
  assert!(result.output("shaped").is_none());
}

#[tokio::test]
async fn pre_cancelled_run_aborts() {
  let mut workflow = Workflow::new("cancelled");
  workflow.step(lit("a", json!({}))).unwrap();
  workflow.commit().unwrap();

  let cancel = CancellationToken::new();
  cancel.cancel();

  let result = executor().execute(&workflow, json!({}), cancel).await;
  assert!(matches!(result, Err(ExecutionError::Cancelled)));
}

#[tokio::test]
async fn each_execute_call_is_an_independent_run() {
  let counters = ScreeningCounters::default();
  let workflow = screening_workflow(&counters);
  let executor = executor();

  let first = executor
    .execute(
      &workflow,
      json!({ "resumeText": "software engineer" }),
      CancellationToken::new(),
    )
    .await
    .unwrap();
  let second = executor
    .execute(
      &workflow,
      json!({ "resumeText": "florist" }),
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_ne!(first.execution_id, second.execution_id);
  assert_eq!(first.state("askAboutSpecialty"), Some(StepState::Completed));
  assert_eq!(second.state("askAboutSpecialty"), Some(StepState::Skipped));
  assert_eq!(counters.gather.load(Ordering::SeqCst), 2);
}

#[derive(Default)]
struct RecordingObserver {
  events: Mutex<Vec<String>>,
}

impl RunObserver for RecordingObserver {
  fn on_step_started(&self, _execution_id: &str, step_id: &str) {
    self.events.lock().unwrap().push(format!("started:{step_id}"));
  }

  fn on_step_completed(&self, _execution_id: &str, step_id: &str, _output: &serde_json::Value) {
    self.events.lock().unwrap().push(format!("completed:{step_id}"));
  }

  fn on_step_skipped(&self, _execution_id: &str, step_id: &str) {
    self.events.lock().unwrap().push(format!("skipped:{step_id}"));
  }

  fn on_step_failed(&self, _execution_id: &str, step_id: &str, _error: &str) {
    self.events.lock().unwrap().push(format!("failed:{step_id}"));
  }

  fn on_run_completed(&self, _execution_id: &str) {
    self.events.lock().unwrap().push("run_completed".to_string());
  }

  fn on_run_failed(&self, _execution_id: &str, step_id: &str) {
    self.events.lock().unwrap().push(format!("run_failed:{step_id}"));
  }
}

#[tokio::test]
async fn observers_see_lifecycle_events_in_order() {
  let observer = Arc::new(RecordingObserver::default());

  let mut workflow = Workflow::new("observed");
  workflow
    .step(lit("a", json!({ "go": false })))
    .unwrap()
    .then(lit("b", json!({})))
    .unwrap()
    .then_when(lit("c", json!({})), "a.go", json!(true))
    .unwrap();
  workflow.commit().unwrap();

  let result = Executor::new(Capabilities::empty())
    .observe(observer.clone())
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();
  assert!(result.is_completed());

  let events = observer.events.lock().unwrap().clone();
  // The guard on `c` can only resolve once `b` (its edge source) completes.
  assert_eq!(
    events,
    vec![
      "started:a",
      "completed:a",
      "started:b",
      "completed:b",
      "skipped:c",
      "run_completed",
    ]
  );
}

struct ChunkedClient {
  chunks: Vec<&'static str>,
}

impl TextGeneration for ChunkedClient {
  fn generate(
    &self,
    _prompt: &str,
    _output_contract: Option<&Contract>,
  ) -> BoxFuture<'_, Result<Generation, GenerationError>> {
    Box::pin(async {
      Ok(Generation {
        text: String::new(),
        object: None,
      })
    })
  }

  fn generate_stream(&self, _prompt: &str) -> BoxFuture<'_, Result<TextStream, GenerationError>> {
    let chunks: Vec<Result<String, GenerationError>> =
      self.chunks.iter().map(|c| Ok(c.to_string())).collect();
    Box::pin(async move { Ok(futures::stream::iter(chunks).boxed() as TextStream) })
  }
}

#[tokio::test]
async fn streaming_step_forwards_chunks_and_records_concatenation() {
  let forwarded: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

  let streaming = Step::new("draft-question", {
    let forwarded = forwarded.clone();
    move |ctx: StepContext| {
      let forwarded = forwarded.clone();
      async move {
        let client = ctx
          .capabilities()
          .text_generation()
          .ok_or_else(|| StepError::missing_capability("text-generation"))?;
        let mut stream = client.generate_stream("ask the candidate something").await?;

        let mut question = String::new();
        while let Some(chunk) = stream.next().await {
          let chunk = chunk?;
          // Partial output goes to the external consumer before the step
          // completes; dependents still only see the final output.
          forwarded.lock().unwrap().push(chunk.clone());
          question.push_str(&chunk);
        }
        Ok(json!({ "question": question.trim() }))
      }
    }
  })
  .requires("text-generation");

  let mut workflow = Workflow::new("streaming");
  workflow.step(streaming).unwrap();
  workflow.commit().unwrap();

  let capabilities = Capabilities::builder()
    .text_generation(Arc::new(ChunkedClient {
      chunks: vec!["How did ", "you get ", "into Rust?"],
    }))
    .build();

  let result = Executor::new(capabilities)
    .execute(&workflow, json!({}), CancellationToken::new())
    .await
    .unwrap();

  assert!(result.is_completed());
  assert_eq!(
    result.output("draft-question"),
    Some(&json!({ "question": "How did you get into Rust?" }))
  );
  assert_eq!(forwarded.lock().unwrap().len(), 3);
}
