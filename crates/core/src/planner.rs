//! Two-stage hierarchical plan synthesis.
//!
//! Stage one asks the backend only for a project name and directory
//! layout; stage two, armed with that scaffold, asks for the phased plan
//! itself. Splitting the calls keeps each prompt small enough for local
//! models to answer with valid JSON most of the time, and the layout from
//! stage one anchors the file paths stage two hands to the executor.

use crate::inference::{ClientError, OllamaClient};
use crate::llm_output::extract_json_object;
use chrono::Utc;
use qf_protocol::{
    AgentKind, ExecutionPlan, ExecutionState, Phase, PhaseStatus, PlanPreferences, Task,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("plan generation failed: {0}")]
    Generation(#[from] ClientError),

    #[error("no JSON object found in response")]
    NoJson,

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Input to plan generation.
#[derive(Debug, Clone)]
pub struct PlanGenerationRequest {
    pub query: String,
    pub current_dir: Option<String>,
    pub preferences: PlanPreferences,
}

impl PlanGenerationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            current_dir: None,
            preferences: PlanPreferences::default(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
struct FileStructureDraft {
    #[serde(default)]
    dirs: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize, Debug)]
struct RawPlan {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    phases: Vec<RawPhase>,
}

#[derive(Deserialize, Debug)]
struct RawPhase {
    #[serde(default)]
    name: String,
    #[serde(default)]
    agent: String,
    #[serde(default)]
    tasks: Vec<RawTask>,
    #[serde(default)]
    success_criteria: String,
    #[serde(default)]
    estimated_time: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct RawTask {
    #[serde(default)]
    description: String,
}

/// Generates execution plans for complex queries.
pub struct Planner {
    client: Arc<OllamaClient>,
}

impl Planner {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }

    /// Stage one: ask for the expected directory layout.
    ///
    /// Any failure here degrades to an empty mapping; a plan without a
    /// pre-declared layout is still executable.
    pub async fn generate_file_structure(
        &self,
        query: &str,
    ) -> BTreeMap<String, Vec<String>> {
        let prompt = build_structure_prompt(query);

        let raw = match self.client.generate_sync(&prompt).await {
            Ok(result) => result.response,
            Err(err) => {
                tracing::warn!(error = %err, "file structure generation failed, proceeding without");
                return BTreeMap::new();
            }
        };

        match parse_file_structure(&raw) {
            Ok(dirs) => dirs,
            Err(err) => {
                tracing::warn!(error = %err, "file structure response unparseable, proceeding without");
                BTreeMap::new()
            }
        }
    }

    /// Stage two: generate the phased plan, anchored to the layout from
    /// stage one.
    pub async fn generate(
        &self,
        request: &PlanGenerationRequest,
    ) -> Result<ExecutionPlan, PlanError> {
        let structure = self.generate_file_structure(&request.query).await;

        let prompt = build_planning_prompt(request, &structure);
        let result = self.client.generate_sync(&prompt).await?;

        let mut plan = parse_plan_response(&result.response)?;
        plan.id = generate_plan_id();
        plan.file_structure = structure;
        plan.created_at = Utc::now();
        plan.updated_at = plan.created_at;
        plan.state = ExecutionState::default();

        Ok(plan)
    }
}

fn build_structure_prompt(query: &str) -> String {
    format!(
        r#"You are planning the file layout for a software project.

User Request: {query}

Choose a short snake_case project name and list every file the project needs, grouped by directory.

Respond with ONLY a JSON object in this EXACT format:
{{"dirs": {{"project_name/": ["main.py", "requirements.txt"], "project_name/src/": ["app.py"]}}}}

JSON Response:"#
    )
}

fn build_planning_prompt(
    request: &PlanGenerationRequest,
    structure: &BTreeMap<String, Vec<String>>,
) -> String {
    let project_root = structure
        .keys()
        .next()
        .map(|dir| dir.trim_end_matches('/').to_string())
        .unwrap_or_else(|| "project".to_string());
    let total_files: usize = structure.values().map(Vec::len).sum();

    let context_info = match &request.current_dir {
        Some(dir) => format!("\nProject Context:\n- Current Directory: {dir}\n"),
        None => String::new(),
    };

    format!(
        r#"You are a senior software architect planning a complex software development task.

User Request: {query}
{context_info}
The project root is "{project_root}" and the layout declares {total_files} files.

Task: Generate a detailed, phased implementation plan.

IMPORTANT RULES:
1. Break down into 3-5 logical phases
2. Each phase should be completable in 5-30 minutes
3. Assign appropriate agent: code, data, infra, or sec
4. Tasks MUST reference full file paths rooted at {project_root}/
5. Define clear success criteria
6. Estimate realistic time

Respond with ONLY a JSON object in this EXACT format:
{{
  "title": "Brief plan title",
  "description": "One-sentence summary of what will be built",
  "phases": [
    {{
      "name": "Phase name",
      "agent": "code|data|infra|sec",
      "tasks": [
        {{"description": "Specific task 1"}},
        {{"description": "Specific task 2"}}
      ],
      "success_criteria": "How to verify this phase succeeded",
      "estimated_time": "5-10 minutes",
      "dependencies": []
    }}
  ]
}}

Guidelines for phases:
- Phase 1: Usually setup/design/schema
- Middle phases: Core implementation
- Final phase: Testing and verification
- Use "code" agent for general programming tasks
- Use "data" agent for database/SQL work
- Use "infra" agent for deployment/Docker/K8s
- Use "sec" agent for security audits

JSON Response:"#,
        query = request.query,
    )
}

/// Parse the stage-one layout response.
pub fn parse_file_structure(raw: &str) -> Result<BTreeMap<String, Vec<String>>, PlanError> {
    let json = extract_json_object(raw).ok_or(PlanError::NoJson)?;
    let draft: FileStructureDraft = serde_json::from_str(json)?;
    Ok(draft.dirs)
}

/// Parse the stage-two plan response into an [`ExecutionPlan`].
///
/// Assigns stable `phase-N` / `task-i-j` ids, normalizes agent labels
/// onto the closed set, and initializes every status to pending. The
/// returned plan still needs its id, layout and timestamps set.
pub fn parse_plan_response(raw: &str) -> Result<ExecutionPlan, PlanError> {
    let json = extract_json_object(raw).ok_or(PlanError::NoJson)?;
    let raw_plan: RawPlan = serde_json::from_str(json)?;

    let phases = raw_plan
        .phases
        .into_iter()
        .enumerate()
        .map(|(i, raw_phase)| {
            let tasks = raw_phase
                .tasks
                .into_iter()
                .enumerate()
                .map(|(j, raw_task)| Task {
                    id: format!("task-{}-{}", i + 1, j + 1),
                    description: raw_task.description,
                    completed: false,
                    result: None,
                    error: None,
                })
                .collect();

            Phase {
                id: format!("phase-{}", i + 1),
                name: raw_phase.name,
                agent: AgentKind::normalize(&raw_phase.agent),
                tasks,
                success_criteria: raw_phase.success_criteria,
                estimated_time: raw_phase.estimated_time,
                dependencies: raw_phase.dependencies,
                status: PhaseStatus::Pending,
            }
        })
        .collect();

    Ok(ExecutionPlan {
        id: String::new(),
        title: raw_plan.title,
        description: raw_plan.description,
        file_structure: BTreeMap::new(),
        phases,
        state: ExecutionState::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
}

/// Render a plan as markdown for human review.
pub fn render_markdown(plan: &ExecutionPlan) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", plan.title));
    md.push_str(&format!("{}\n\n", plan.description));
    md.push_str(&format!("**Plan ID:** {}  \n", plan.id));
    md.push_str(&format!(
        "**Created:** {}  \n\n",
        plan.created_at.format("%Y-%m-%d %H:%M:%S")
    ));
    md.push_str("---\n\n");

    for (i, phase) in plan.phases.iter().enumerate() {
        md.push_str(&format!("## Phase {}: {}\n\n", i + 1, phase.name));
        md.push_str(&format!("**Agent:** {}  \n", phase.agent));
        md.push_str(&format!("**Estimated Time:** {}  \n\n", phase.estimated_time));

        md.push_str("**Tasks:**\n");
        for task in &phase.tasks {
            md.push_str(&format!("- [ ] {}\n", task.description));
        }
        md.push('\n');

        md.push_str(&format!(
            "**Success Criteria:**  \n{}\n\n",
            phase.success_criteria
        ));

        if !phase.dependencies.is_empty() {
            md.push_str(&format!(
                "**Dependencies:** {}\n\n",
                phase.dependencies.join(", ")
            ));
        }

        md.push_str("---\n\n");
    }

    md
}

fn generate_plan_id() -> String {
    format!("plan_{}", Utc::now().format("%Y%m%d_%H%M%S"))
}
