use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use trellis_executor::{Executor, RunStatus};
use trellis_step::Capabilities;

mod model;
mod screening;

use model::ScriptedModel;

/// Trellis - a step-based workflow orchestration engine
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a registered workflow with a JSON payload from stdin
  Run {
    /// Name of the workflow to run
    #[arg(long, default_value = screening::WORKFLOW_NAME)]
    workflow: String,
  },

  /// List the registered workflows
  List,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run { workflow }) => run_workflow(workflow)?,
    Some(Commands::List) => {
      let registry = screening::built_in_registry()?;
      for name in registry.names() {
        println!("{name}");
      }
    }
    None => {
      println!("trellis - use --help to see available commands");
    }
  }

  Ok(())
}

fn run_workflow(name: String) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_workflow_async(name).await })
}

async fn run_workflow_async(name: String) -> Result<()> {
  let registry = screening::built_in_registry().context("failed to build workflow registry")?;
  let workflow = registry
    .get(&name)
    .with_context(|| format!("workflow '{name}' not found"))?;

  eprintln!("Loaded workflow: {}", workflow.name());

  let payload = read_payload_from_stdin()?;
  eprintln!("Payload: {payload}");

  let capabilities = Capabilities::builder()
    .text_generation(Arc::new(ScriptedModel))
    .build();
  let executor = Executor::new(capabilities);

  let cancel = CancellationToken::new();
  let result = executor
    .execute(&workflow, payload, cancel)
    .await
    .context("workflow execution failed")?;

  eprintln!("Execution completed: {}", result.execution_id);
  match &result.status {
    RunStatus::Completed => eprintln!("Status: completed"),
    RunStatus::Failed { step_id, error } => {
      eprintln!("Status: failed at step '{step_id}': {error}")
    }
  }
  eprintln!("Steps completed: {}", result.results.len());

  println!("{}", serde_json::to_string_pretty(&result.results)?);

  Ok(())
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read payload from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
    }
  }
}
