//! The built-in candidate-screening workflow.
//!
//! One gathering step reads the resume, then the graph forks: a technical
//! branch (specialty question, skills evaluation) and a non-technical branch
//! (role-interest question), converging on a cultural-fit assessment and a
//! final recommendation.

use serde_json::json;
use trellis_step::{
  Contract, FieldKind, Step, StepContext, StepError, TEXT_GENERATION, TextGeneration,
};
use trellis_workflow::{Workflow, WorkflowError, WorkflowRegistry};

use futures::StreamExt;
use std::sync::Arc;

pub const WORKFLOW_NAME: &str = "candidate-screening";

fn client(ctx: &StepContext) -> Result<Arc<dyn TextGeneration>, StepError> {
  ctx
    .capabilities()
    .text_generation()
    .ok_or_else(|| StepError::missing_capability(TEXT_GENERATION))
}

fn resume_text(ctx: &StepContext) -> Result<String, StepError> {
  ctx
    .step_output("gatherCandidateInfo")
    .and_then(|info| info.get("resumeText"))
    .and_then(|v| v.as_str())
    .map(str::to_string)
    .ok_or_else(|| StepError::upstream_unavailable("gatherCandidateInfo"))
}

fn gather_candidate_info() -> Step {
  Step::new("gatherCandidateInfo", |ctx: StepContext| async move {
    let client = client(&ctx)?;
    let resume = ctx
      .trigger()
      .get("resumeText")
      .and_then(|v| v.as_str())
      .ok_or_else(|| StepError::failed("trigger payload missing resumeText"))?
      .to_string();

    let contract = Contract::new()
      .field("candidateName", FieldKind::String)
      .field("isTechnical", FieldKind::Boolean)
      .field("specialty", FieldKind::String);
    let prompt = format!("You are given this resume text:\n\"{resume}\"");

    let generation = client.generate(&prompt, Some(&contract)).await?;
    let mut info = generation
      .object
      .and_then(|v| v.as_object().cloned())
      .unwrap_or_default();
    info.insert("resumeText".to_string(), json!(resume));
    Ok(serde_json::Value::Object(info))
  })
  .input_contract(Contract::new().field("resumeText", FieldKind::String))
  .output_contract(
    Contract::new()
      .field("candidateName", FieldKind::String)
      .field("isTechnical", FieldKind::Boolean)
      .field("specialty", FieldKind::String)
      .field("resumeText", FieldKind::String),
  )
  .requires(TEXT_GENERATION)
}

/// Streams the question chunk by chunk; the recorded output is the
/// concatenation.
fn ask_about_specialty() -> Step {
  Step::new("askAboutSpecialty", |ctx: StepContext| async move {
    let client = client(&ctx)?;
    let info = ctx
      .step_output("gatherCandidateInfo")
      .ok_or_else(|| StepError::upstream_unavailable("gatherCandidateInfo"))?;
    let prompt = format!(
      "You are a recruiter. Given the resume below, craft a short question \
       for {} about how they got into \"{}\".\nResume: {}",
      info["candidateName"], info["specialty"], info["resumeText"]
    );

    let mut stream = client.generate_stream(&prompt).await?;
    let mut question = String::new();
    while let Some(chunk) = stream.next().await {
      question.push_str(&chunk?);
    }
    Ok(json!({ "question": question.trim() }))
  })
  .output_contract(Contract::new().field("question", FieldKind::String))
  .requires(TEXT_GENERATION)
}

fn ask_about_role() -> Step {
  Step::new("askAboutRole", |ctx: StepContext| async move {
    let client = client(&ctx)?;
    let info = ctx
      .step_output("gatherCandidateInfo")
      .ok_or_else(|| StepError::upstream_unavailable("gatherCandidateInfo"))?;
    let prompt = format!(
      "You are a recruiter. Given the resume below, craft a short question \
       for {} asking what interests them most about this role.\nResume: {}",
      info["candidateName"], info["resumeText"]
    );

    let generation = client.generate(&prompt, None).await?;
    Ok(json!({ "question": generation.text.trim() }))
  })
  .output_contract(Contract::new().field("question", FieldKind::String))
  .requires(TEXT_GENERATION)
}

fn evaluate_technical_skills() -> Step {
  Step::new("evaluateTechnicalSkills", |ctx: StepContext| async move {
    let client = client(&ctx)?;
    let resume = resume_text(&ctx)?;
    let contract = Contract::new()
      .field("technicalScore", FieldKind::Number)
      .field("strengths", FieldKind::Array)
      .field("weaknesses", FieldKind::Array);
    let prompt = format!(
      "You are a technical recruiter. Given the resume below, evaluate the \
       candidate's technical skills. Provide a technical score from 0-100, \
       and list their key strengths and areas for improvement.\nResume: {resume}"
    );

    let generation = client.generate(&prompt, Some(&contract)).await?;
    Ok(json!({ "skillAssessment": generation.object.unwrap_or(json!({})) }))
  })
  .output_contract(Contract::new().field("skillAssessment", FieldKind::Object))
  .requires(TEXT_GENERATION)
}

fn assess_cultural_fit() -> Step {
  Step::new("assessCulturalFit", |ctx: StepContext| async move {
    let client = client(&ctx)?;
    let resume = resume_text(&ctx)?;
    let contract = Contract::new()
      .field("fitScore", FieldKind::Number)
      .field("notes", FieldKind::String);
    let prompt = format!(
      "You are a recruiter evaluating cultural fit. Given the resume below, \
       assess how well the candidate might fit into a collaborative, \
       fast-paced tech company. Provide a fit score from 0-100 and detailed \
       notes.\nResume: {resume}"
    );

    let generation = client.generate(&prompt, Some(&contract)).await?;
    Ok(json!({ "culturalAssessment": generation.object.unwrap_or(json!({})) }))
  })
  .output_contract(Contract::new().field("culturalAssessment", FieldKind::Object))
  .requires(TEXT_GENERATION)
}

fn make_recommendation() -> Step {
  Step::new("makeRecommendation", |ctx: StepContext| async move {
    let client = client(&ctx)?;
    // The technical evaluation only exists on the technical branch.
    let technical = ctx
      .step_output("evaluateTechnicalSkills")
      .and_then(|v| v.get("skillAssessment"))
      .cloned()
      .unwrap_or(json!({}));
    let cultural = ctx
      .step_output("assessCulturalFit")
      .and_then(|v| v.get("culturalAssessment"))
      .cloned()
      .ok_or_else(|| StepError::upstream_unavailable("assessCulturalFit"))?;

    let contract = Contract::new()
      .field("proceed", FieldKind::Boolean)
      .field("reasoning", FieldKind::String)
      .field("nextSteps", FieldKind::String);
    let prompt = format!(
      "You are a senior recruiter making a final recommendation. Consider:\n\
       1. Technical Score: {}/100\n\
       2. Cultural Fit Score: {}/100\n\
       3. Cultural Fit Notes: {}\n\
       Make a recommendation on whether to proceed with the candidate and \
       explain why. Also suggest next steps in the recruitment process.",
      technical.get("technicalScore").unwrap_or(&json!("n/a")),
      cultural.get("fitScore").unwrap_or(&json!("n/a")),
      cultural.get("notes").unwrap_or(&json!("")),
    );

    let generation = client.generate(&prompt, Some(&contract)).await?;
    Ok(json!({ "recommendation": generation.object.unwrap_or(json!({})) }))
  })
  .output_contract(Contract::new().field("recommendation", FieldKind::Object))
  .requires(TEXT_GENERATION)
}

/// Build and commit the candidate-screening workflow.
pub fn candidate_workflow() -> Result<Workflow, WorkflowError> {
  let assess = assess_cultural_fit();
  let recommend = make_recommendation();

  let mut workflow = Workflow::new(WORKFLOW_NAME)
    .with_trigger_contract(Contract::new().field("resumeText", FieldKind::String));
  workflow
    .step(gather_candidate_info())?
    .then_when(
      ask_about_specialty(),
      "gatherCandidateInfo.isTechnical",
      json!(true),
    )?
    .then(evaluate_technical_skills())?
    .then(assess.clone())?
    .then(recommend.clone())?
    .after("gatherCandidateInfo")?
    .step_when(
      ask_about_role(),
      "gatherCandidateInfo.isTechnical",
      json!(false),
    )?
    .then(assess)?
    .then(recommend)?;
  workflow.commit()?;
  Ok(workflow)
}

/// All built-in workflows, committed and registered.
pub fn built_in_registry() -> Result<WorkflowRegistry, WorkflowError> {
  let mut registry = WorkflowRegistry::new();
  registry.register(candidate_workflow()?)?;
  Ok(registry)
}
