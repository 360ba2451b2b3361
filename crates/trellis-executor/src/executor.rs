//! The scheduler: walks a committed graph from trigger to terminal steps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use trellis_step::{Capabilities, Step, StepContext};
use trellis_workflow::{Edge, EdgeSource, Graph, Workflow};

use crate::context::ExecutionContext;
use crate::error::{ExecutionError, StepFailure};
use crate::observer::RunObserver;
use crate::result::{RunResult, RunStatus};
use crate::state::StepState;

/// Executes committed workflows against a fixed set of injected
/// capabilities. One executor may serve any number of runs; every run gets
/// its own [`ExecutionContext`].
pub struct Executor {
  capabilities: Capabilities,
  observers: Vec<Arc<dyn RunObserver>>,
}

impl Executor {
  pub fn new(capabilities: Capabilities) -> Self {
    Self {
      capabilities,
      observers: Vec::new(),
    }
  }

  /// Subscribe an observer to step and run lifecycle events.
  pub fn observe(mut self, observer: Arc<dyn RunObserver>) -> Self {
    self.observers.push(observer);
    self
  }

  /// Execute a workflow with the given trigger payload.
  ///
  /// Step failures do not produce an `Err`: they are folded into the
  /// returned [`RunResult`] together with the partial results map. Errors
  /// here mean the run could not proceed at all (lifecycle misuse, trigger
  /// validation, cancellation).
  #[instrument(
    name = "workflow_execute",
    skip(self, workflow, payload, cancel),
    fields(workflow = %workflow.name())
  )]
  pub async fn execute(
    &self,
    workflow: &Workflow,
    payload: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<RunResult, ExecutionError> {
    if !workflow.is_committed() {
      return Err(ExecutionError::WorkflowNotCommitted {
        name: workflow.name().to_string(),
      });
    }

    if let Some(contract) = workflow.trigger_contract() {
      contract
        .validate(&payload)
        .map_err(|violations| ExecutionError::InvalidTriggerPayload { violations })?;
    }

    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(
      execution_id = %execution_id,
      workflow = %workflow.name(),
      trigger_payload = %payload,
      "workflow_started"
    );

    let trigger = Arc::new(payload);
    let mut ctx = ExecutionContext::new(execution_id.clone(), trigger.clone(), workflow);
    let graph = workflow.graph();

    let result = self
      .run_loop(workflow, &graph, &mut ctx, &cancel)
      .await;

    match &result {
      Ok(run) if run.is_completed() => {
        info!(execution_id = %execution_id, "workflow_completed");
        self.each_observer(|observer| observer.on_run_completed(&execution_id));
      }
      Ok(run) => {
        if let RunStatus::Failed { step_id, error } = &run.status {
          error!(
            execution_id = %execution_id,
            step_id = %step_id,
            error = %error,
            "workflow_failed"
          );
          self.each_observer(|observer| observer.on_run_failed(&execution_id, step_id));
        }
      }
      Err(e) => {
        error!(execution_id = %execution_id, error = %e, "workflow_failed");
      }
    }

    result
  }

  /// Spawn ready steps and drain completions until the graph is settled.
  ///
  /// Completions are handled one at a time: each finished step resolves
  /// transitions and spawns any newly-ready dependents immediately, so a
  /// slow step never stalls an independent chain that became ready while it
  /// was still running.
  async fn run_loop(
    &self,
    workflow: &Workflow,
    graph: &Graph,
    ctx: &mut ExecutionContext,
    cancel: &CancellationToken,
  ) -> Result<RunResult, ExecutionError> {
    let edges = workflow.edges();
    let execution_id = ctx.execution_id().to_string();
    // (step_id, error) per failed step; the first direct failure is the
    // run's reported failure.
    let mut failures: HashMap<String, String> = HashMap::new();
    let mut first_failure: Option<(String, String)> = None;
    let mut in_flight = FuturesUnordered::new();

    loop {
      if cancel.is_cancelled() {
        warn!(execution_id = %execution_id, "workflow cancelled");
        return Err(ExecutionError::Cancelled);
      }

      self.resolve_transitions(workflow, graph, edges, ctx, &mut failures);

      let ready = ctx.ready_steps();
      if !ready.is_empty() {
        info!(
          execution_id = %execution_id,
          ready_steps = ?ready,
          "spawning ready steps"
        );

        let snapshot = Arc::new(ctx.results().clone());
        for step_id in ready {
          let step = workflow
            .get_step(&step_id)
            .expect("ready step is registered")
            .clone();
          let input = build_input(graph, edges, ctx, &step_id);
          let step_ctx = StepContext::new(
            execution_id.clone(),
            step_id.clone(),
            ctx.trigger().clone(),
            input,
            snapshot.clone(),
            self.capabilities.clone(),
          );

          ctx.set_state(&step_id, StepState::Running);
          info!(execution_id = %execution_id, step_id = %step_id, "step_started");
          self.each_observer(|observer| observer.on_step_started(&execution_id, &step_id));

          in_flight.push(tokio::spawn(async move {
            let outcome = run_step(&step, step_ctx).await;
            (step_id, outcome)
          }));
        }
      }

      if in_flight.is_empty() {
        break;
      }

      // In-flight siblings are allowed to finish even when one step fails;
      // cancellation is the only thing that interrupts them.
      let join_result = tokio::select! {
        Some(join_result) = in_flight.next() => join_result,
        _ = cancel.cancelled() => {
          warn!(execution_id = %execution_id, "workflow cancelled during step execution");
          return Err(ExecutionError::Cancelled);
        }
      };

      let (step_id, outcome) = join_result.map_err(|e| ExecutionError::Join(e.to_string()))?;

      match outcome {
        Ok(output) => {
          info!(
            execution_id = %execution_id,
            step_id = %step_id,
            output = %output,
            "step_completed"
          );
          self
            .each_observer(|observer| observer.on_step_completed(&execution_id, &step_id, &output));
          ctx.record_result(step_id.clone(), output);
          ctx.set_state(&step_id, StepState::Completed);
        }
        Err(failure) => {
          let detail = failure.to_string();
          error!(
            execution_id = %execution_id,
            step_id = %step_id,
            error = %detail,
            "step_failed"
          );
          self.each_observer(|observer| observer.on_step_failed(&execution_id, &step_id, &detail));
          if first_failure.is_none() {
            first_failure = Some((step_id.clone(), detail.clone()));
          }
          failures.insert(step_id.clone(), detail);
          ctx.set_state(&step_id, StepState::Failed);
        }
      }
    }

    let status = match first_failure {
      Some((step_id, error)) => RunStatus::Failed { step_id, error },
      None => RunStatus::Completed,
    };

    let terminal_outputs = graph
      .terminal_steps()
      .into_iter()
      .filter_map(|step_id| {
        ctx
          .results()
          .get(step_id)
          .map(|output| (step_id.to_string(), output.clone()))
      })
      .collect();

    Ok(RunResult {
      execution_id,
      status,
      results: ctx.results().clone(),
      terminal_outputs,
      states: ctx.states().clone(),
      failures,
    })
  }

  /// Propagate resolution through pending steps until a fixpoint.
  ///
  /// A pending step whose inbound sources are all resolved becomes ready if
  /// at least one inbound edge fired, or skipped if none did. An inbound
  /// failure wins over both: the step is marked failed without running.
  fn resolve_transitions(
    &self,
    workflow: &Workflow,
    graph: &Graph,
    edges: &[Edge],
    ctx: &mut ExecutionContext,
    failures: &mut HashMap<String, String>,
  ) {
    let execution_id = ctx.execution_id().to_string();
    loop {
      let mut changed = false;

      for step_id in workflow.steps().keys() {
        if ctx.state(step_id) != StepState::Pending {
          continue;
        }

        let mut failed_source: Option<String> = None;
        let mut all_resolved = true;
        let mut any_fires = false;

        for &index in graph.inbound(step_id) {
          let edge = &edges[index];
          match &edge.from {
            EdgeSource::Trigger => {
              // Trigger edges are unconditional by commit validation.
              any_fires = true;
            }
            EdgeSource::Step { step_id: source } => match ctx.state(source) {
              StepState::Completed => {
                if edge.condition.evaluate(ctx.results()) {
                  any_fires = true;
                }
              }
              StepState::Skipped => {}
              StepState::Failed => {
                failed_source = Some(source.clone());
              }
              StepState::Pending | StepState::Ready | StepState::Running => {
                all_resolved = false;
              }
            },
          }
        }

        if let Some(upstream) = failed_source {
          let detail = format!("upstream step '{upstream}' failed");
          error!(
            execution_id = %execution_id,
            step_id = %step_id,
            error = %detail,
            "step_failed"
          );
          self.each_observer(|observer| observer.on_step_failed(&execution_id, step_id, &detail));
          failures.insert(step_id.clone(), detail);
          ctx.set_state(step_id, StepState::Failed);
          changed = true;
        } else if all_resolved {
          if any_fires {
            ctx.set_state(step_id, StepState::Ready);
          } else {
            info!(execution_id = %execution_id, step_id = %step_id, "step_skipped");
            self.each_observer(|observer| observer.on_step_skipped(&execution_id, step_id));
            ctx.set_state(step_id, StepState::Skipped);
          }
          changed = true;
        }
      }

      if !changed {
        break;
      }
    }
  }

  fn each_observer(&self, mut f: impl FnMut(&dyn RunObserver)) {
    for observer in &self.observers {
      f(observer.as_ref());
    }
  }
}

/// Build a step's direct input from its fired inbound edges: one firing
/// predecessor passes its output through, several produce an object keyed
/// by predecessor id (trigger edges contribute the trigger payload under
/// the `trigger` key).
fn build_input(
  graph: &Graph,
  edges: &[Edge],
  ctx: &ExecutionContext,
  step_id: &str,
) -> serde_json::Value {
  let mut fired = serde_json::Map::new();

  for &index in graph.inbound(step_id) {
    let edge = &edges[index];
    match &edge.from {
      EdgeSource::Trigger => {
        fired.insert("trigger".to_string(), (**ctx.trigger()).clone());
      }
      EdgeSource::Step { step_id: source } => {
        if ctx.state(source) == StepState::Completed && edge.condition.evaluate(ctx.results()) {
          if let Some(output) = ctx.results().get(source) {
            fired.insert(source.clone(), output.clone());
          }
        }
      }
    }
  }

  match fired.len() {
    0 => serde_json::Value::Null,
    1 => fired.into_iter().next().map(|(_, value)| value).unwrap_or(serde_json::Value::Null),
    _ => serde_json::Value::Object(fired),
  }
}

/// Invoke one step body with capability, contract, and deadline checks.
async fn run_step(step: &Step, ctx: StepContext) -> Result<serde_json::Value, StepFailure> {
  for capability in step.required_capabilities() {
    if !ctx.capabilities().contains(capability) {
      return Err(StepFailure::MissingCapability {
        step_id: step.id().to_string(),
        capability: capability.clone(),
      });
    }
  }

  if let Some(contract) = step.declared_input_contract() {
    contract
      .validate(ctx.input())
      .map_err(|violations| StepFailure::InputContract {
        step_id: step.id().to_string(),
        violations,
      })?;
  }

  let body = step.body().run(ctx);
  let output = match step.timeout() {
    Some(timeout_ms) => {
      match tokio::time::timeout(Duration::from_millis(timeout_ms), body).await {
        Ok(result) => result,
        Err(_) => {
          return Err(StepFailure::Timeout {
            step_id: step.id().to_string(),
            timeout_ms,
          });
        }
      }
    }
    None => body.await,
  }
  .map_err(|source| StepFailure::Execution {
    step_id: step.id().to_string(),
    source,
  })?;

  if let Some(contract) = step.declared_output_contract() {
    contract
      .validate(&output)
      .map_err(|violations| StepFailure::OutputContract {
        step_id: step.id().to_string(),
        violations,
      })?;
  }

  Ok(output)
}
