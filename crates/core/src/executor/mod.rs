//! Resumable phase-by-phase plan execution.
//!
//! The executor is the only mutator of plan state. It drives phases
//! sequentially, checkpointing before each one, interpreting the agent
//! answer as a side-effect program (file writes and shell commands), and
//! recording progress so an interrupted run picks up where it stopped.

pub mod extract;

use crate::agents::{AgentError, AgentRequest};
use crate::llm_output::truncate;
use crate::manifest::ProjectManifest;
use crate::orchestrator::Orchestrator;
use chrono::Utc;
use extract::{
    extract_command_scripts, extract_file_blocks, is_dangerous_command, is_unsafe_path,
    normalize_path,
};
use qf_protocol::{AgentKind, Checkpoint, ExecutionPlan, ExecutionStatus, PhaseStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Generous per-phase deadline; local models are slow.
const PHASE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// How much of the agent answer is echoed after a phase.
const ANSWER_ECHO_LIMIT: usize = 500;

#[derive(Error, Debug)]
pub enum ExecutorError {
    /// A dependency references a phase that does not exist in the plan.
    /// Checked before any phase runs.
    #[error("{0}")]
    UnresolvableDependency(String),

    /// A dependency exists but has not completed.
    #[error("dependencies not met for phase {0}")]
    DependenciesNotMet(String),

    #[error("phase {index} ({name}) failed: {source}")]
    PhaseFailed {
        index: usize,
        name: String,
        #[source]
        source: PhaseError,
    },
}

/// Failure inside a single phase run.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("agent {0} not found")]
    AgentNotFound(AgentKind),

    #[error("agent execution failed: {0}")]
    Agent(#[from] AgentError),

    #[error("phase timed out after {0:?}")]
    Timeout(Duration),

    #[error("command {command:?} exited with {status}")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("failed to run command {command:?}: {source}")]
    CommandIo {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Executes multi-phase plans with checkpoint support.
pub struct Executor {
    orchestrator: Arc<Orchestrator>,
    workdir: PathBuf,
    checkpoints: HashMap<String, Checkpoint>,
    manifest: Option<ProjectManifest>,
}

impl Executor {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            workdir: PathBuf::from("."),
            checkpoints: HashMap::new(),
            manifest: None,
        }
    }

    /// Root directory extracted files and commands operate in.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// The run's manifest, once execution has started.
    pub fn manifest(&self) -> Option<&ProjectManifest> {
        self.manifest.as_ref()
    }

    pub fn checkpoint(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.get(id)
    }

    /// Run the plan from its current phase to the end.
    ///
    /// Calling this on a previously interrupted plan resumes it:
    /// `started_at` is preserved and already-completed phases are not
    /// re-run.
    pub async fn execute(&mut self, plan: &mut ExecutionPlan) -> Result<(), ExecutorError> {
        // Hard error before any state is touched.
        plan.dependencies_resolvable()
            .map_err(ExecutorError::UnresolvableDependency)?;

        plan.state.status = ExecutionStatus::Running;
        if plan.state.started_at.is_none() {
            plan.state.started_at = Some(Utc::now());
        }
        if plan.state.current_phase < 0 {
            plan.state.current_phase = 0;
        }
        // Phases at or after the resume point are being retried; their
        // failure records would otherwise survive a successful rerun.
        plan.state
            .failed_phases
            .retain(|&i| (i as i32) < plan.state.current_phase);

        if self.manifest.is_none() {
            let mut manifest = ProjectManifest::new(plan.title.clone(), &self.workdir);
            if !plan.file_structure.is_empty() {
                manifest.set_expected_structure(plan.file_structure.clone());
            }
            self.manifest = Some(manifest);
        }

        if let Some(manifest) = &self.manifest {
            if let Err(err) = manifest.initialize_directories() {
                tracing::warn!(error = %err, "could not create project directories");
            }
        }

        tracing::info!(
            plan = %plan.id,
            title = %plan.title,
            phases = plan.phases.len(),
            "starting execution"
        );

        let start_index = plan.state.current_phase.max(0) as usize;
        for index in start_index..plan.phases.len() {
            if !dependencies_met(plan, index) {
                return Err(ExecutorError::DependenciesNotMet(
                    plan.phases[index].name.clone(),
                ));
            }

            let checkpoint = self.create_checkpoint(&plan.id, index);
            plan.state.last_checkpoint = Some(checkpoint.id.clone());

            tracing::info!(
                phase = index + 1,
                total = plan.phases.len(),
                name = %plan.phases[index].name,
                agent = %plan.phases[index].agent,
                estimated = %plan.phases[index].estimated_time,
                "running phase"
            );

            match self.run_phase(plan, index).await {
                Ok(()) => {
                    plan.state.completed_phases.push(index);
                    plan.state.current_phase = (index + 1) as i32;
                    plan.phases[index].status = PhaseStatus::Completed;
                    plan.updated_at = Utc::now();
                    tracing::info!(phase = index + 1, "phase complete");
                }
                Err(source) => {
                    tracing::warn!(phase = index + 1, error = %source, "phase failed, rolling back");
                    self.rollback(&checkpoint);

                    plan.state.status = ExecutionStatus::Failed;
                    plan.state.failed_phases.push(index);
                    plan.phases[index].status = PhaseStatus::Failed;
                    plan.updated_at = Utc::now();

                    return Err(ExecutorError::PhaseFailed {
                        index,
                        name: plan.phases[index].name.clone(),
                        source,
                    });
                }
            }
        }

        plan.state.status = ExecutionStatus::Completed;
        plan.state.completed_at = Some(Utc::now());
        plan.updated_at = Utc::now();

        let duration = plan
            .state
            .completed_at
            .zip(plan.state.started_at)
            .map(|(end, start)| end - start);
        tracing::info!(plan = %plan.id, ?duration, "execution complete");

        Ok(())
    }

    async fn run_phase(
        &mut self,
        plan: &mut ExecutionPlan,
        index: usize,
    ) -> Result<(), PhaseError> {
        plan.phases[index].status = PhaseStatus::InProgress;

        let kind = plan.phases[index].agent;
        let agent = self
            .orchestrator
            .agent_for(kind)
            .ok_or(PhaseError::AgentNotFound(kind))?;

        let query = build_phase_prompt(plan, index, self.manifest.as_ref());
        let request = AgentRequest::new(
            format!("{}-phase-{}", plan.id, plan.phases[index].id),
            query,
        )
        .with_timeout(PHASE_TIMEOUT);

        let response = match tokio::time::timeout(PHASE_TIMEOUT, agent.execute(&request)).await {
            Ok(result) => result?,
            Err(_) => return Err(PhaseError::Timeout(PHASE_TIMEOUT)),
        };

        let phase_name = plan.phases[index].name.clone();
        let files_created = self.write_file_blocks(&response.answer, &phase_name);
        if !files_created.is_empty() {
            tracing::info!(files = ?files_created, "files created");
        }

        let commands = self.run_command_blocks(&response.answer).await?;
        if !commands.is_empty() {
            tracing::info!(commands = ?commands, "commands executed");
        }

        for task in &mut plan.phases[index].tasks {
            task.completed = true;
            task.result = Some(response.answer.clone());
        }

        tracing::info!(answer = %truncate(&response.answer, ANSWER_ECHO_LIMIT), "agent response");

        Ok(())
    }

    /// Write every file fence in the answer, honoring the safety rules.
    ///
    /// Rejections (empty content, unsafe path, already created) and write
    /// failures are logged and skipped; a bad block never aborts the
    /// phase.
    fn write_file_blocks(&mut self, answer: &str, phase_name: &str) -> Vec<String> {
        let Some(manifest) = self.manifest.as_mut() else {
            return Vec::new();
        };

        let mut created = Vec::new();
        for block in extract_file_blocks(answer) {
            if block.content.is_empty() {
                tracing::warn!(path = %block.path, "skipping empty file");
                continue;
            }

            let clean = normalize_path(&block.path);
            if is_unsafe_path(&clean) {
                tracing::warn!(path = %block.path, "skipping unsafe file path");
                continue;
            }

            if manifest.file_exists(&clean) {
                tracing::warn!(path = %clean, "skipping already created file");
                continue;
            }

            let full = self.workdir.join(&clean);
            if let Some(parent) = full.parent() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    tracing::warn!(path = %clean, error = %err, "failed to create directory");
                    continue;
                }
            }
            if let Err(err) = std::fs::write(&full, &block.content) {
                tracing::warn!(path = %clean, error = %err, "failed to write file");
                continue;
            }

            manifest.add_file(&clean, phase_name, "");
            created.push(clean);
        }

        created
    }

    /// Execute every shell fence line by line.
    ///
    /// Comments and blanks are skipped, denylisted lines are skipped with
    /// a warning, and the first non-zero exit aborts the phase. Lines run
    /// independently; `cd` and environment changes do not carry over.
    async fn run_command_blocks(&self, answer: &str) -> Result<Vec<String>, PhaseError> {
        let mut executed = Vec::new();

        for script in extract_command_scripts(answer) {
            for line in script.lines() {
                let command = line.trim();
                if command.is_empty() || command.starts_with('#') {
                    continue;
                }

                if is_dangerous_command(command) {
                    tracing::warn!(command, "skipping potentially dangerous command");
                    continue;
                }

                tracing::info!(command, "running");
                let status = tokio::process::Command::new("bash")
                    .arg("-c")
                    .arg(command)
                    .current_dir(&self.workdir)
                    .status()
                    .await
                    .map_err(|source| PhaseError::CommandIo {
                        command: command.to_string(),
                        source,
                    })?;

                if !status.success() {
                    return Err(PhaseError::CommandFailed {
                        command: command.to_string(),
                        status,
                    });
                }

                executed.push(command.to_string());
            }
        }

        Ok(executed)
    }

    fn create_checkpoint(&mut self, plan_id: &str, phase_index: usize) -> Checkpoint {
        let checkpoint = Checkpoint {
            id: format!("checkpoint-{plan_id}-phase-{phase_index}"),
            plan_id: plan_id.to_string(),
            phase_index,
            timestamp: Utc::now(),
            metadata: Default::default(),
        };
        self.checkpoints
            .insert(checkpoint.id.clone(), checkpoint.clone());
        checkpoint
    }

    /// Restore state to a checkpoint.
    ///
    /// Currently restores nothing; the interface is the hook for a real
    /// filesystem-snapshot mechanism, which must also restore the
    /// manifest to its pre-phase state.
    fn rollback(&self, checkpoint: &Checkpoint) {
        tracing::info!(checkpoint = %checkpoint.id, "rollback to checkpoint");
    }
}

/// Whether every dependency of `plan.phases[index]` matches a completed
/// phase by id or by name.
fn dependencies_met(plan: &ExecutionPlan, index: usize) -> bool {
    let phase = &plan.phases[index];
    phase.dependencies.iter().all(|dep| {
        plan.state.completed_phases.iter().any(|&completed| {
            let completed_phase = &plan.phases[completed];
            completed_phase.id == *dep || completed_phase.name == *dep
        })
    })
}

/// Assemble the phase query: name, manifest context, numbered tasks,
/// success criteria, and the output-format contract the extractor relies
/// on.
fn build_phase_prompt(
    plan: &ExecutionPlan,
    index: usize,
    manifest: Option<&ProjectManifest>,
) -> String {
    let phase = &plan.phases[index];
    let mut query = String::new();

    query.push_str(&format!("Phase: {}\n\n", phase.name));

    if let Some(manifest) = manifest {
        let structure = manifest.file_structure_context();
        if !structure.is_empty() {
            query.push_str(&structure);
            query.push('\n');
        }
        let files = manifest.created_files_context();
        if !files.is_empty() {
            query.push_str(&files);
            query.push('\n');
        }
    }

    query.push_str("Please complete the following tasks:\n\n");
    for (i, task) in phase.tasks.iter().enumerate() {
        query.push_str(&format!("{}. {}\n", i + 1, task.description));
    }

    query.push_str(&format!(
        "\n\nSuccess Criteria: {}\n",
        phase.success_criteria
    ));

    query.push_str(
        r#"
FILE OUTPUT FORMAT - You MUST use this EXACT format to create files:
```python ecommerce_api/routes/products.py
from fastapi import APIRouter
router = APIRouter()

@router.get("/products")
def list_products():
    return {"products": []}
```

RULES:
1. Every code block MUST have the file path on the SAME LINE as the language
2. Include ACTUAL CODE in the block, not placeholders
3. Use FULL relative paths like: ecommerce_api/models/product.py
4. One file per code block
"#,
    );

    query
}
