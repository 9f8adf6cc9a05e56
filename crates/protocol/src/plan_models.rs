//! Execution plan data model.
//!
//! A plan is tagged data plus a state machine, not an object with behavior:
//! the executor is the only mutator, and everything here snapshots cleanly
//! to JSON for cross-process resume. The runtime project manifest is
//! intentionally *not* part of this model; it is rebuilt when execution
//! starts.

use crate::agent_models::AgentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of a single phase.
///
/// ```text
/// pending ──run──▶ in_progress ──success──▶ completed
///                       │
///                       └──failure──▶ failed
/// ```
///
/// `Skipped` is reserved for dependency-based skipping.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// Lifecycle of a whole plan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created by the planner, awaiting review.
    Pending,
    /// Approved by the user, not yet started.
    Approved,
    /// The executor is (or was, if interrupted) driving phases.
    Running,
    /// Every phase completed.
    Completed,
    /// A phase failed; `failed_phases` records which.
    Failed,
    /// Rejected at the approval prompt.
    Cancelled,
}

/// A specific task within a phase.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub completed: bool,

    /// Agent answer snippet recorded when the phase completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A named, dependency-gated unit of work handled by one agent.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Phase {
    /// Stable identifier (`phase-1`, `phase-2`, ...).
    pub id: String,
    pub name: String,
    pub agent: AgentKind,
    pub tasks: Vec<Task>,
    pub success_criteria: String,
    pub estimated_time: String,

    /// Phases that must complete first, referenced by id *or* name.
    #[serde(default)]
    pub dependencies: Vec<String>,

    pub status: PhaseStatus,
}

/// Mutable execution bookkeeping, persisted alongside the plan.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutionState {
    pub status: ExecutionStatus,

    /// Index of the next phase to run. Negative means "start fresh".
    pub current_phase: i32,

    /// Indices of completed phases, in encounter order.
    #[serde(default)]
    pub completed_phases: Vec<usize>,

    /// Indices of failed phases, in encounter order.
    #[serde(default)]
    pub failed_phases: Vec<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<String>,

    /// Set once on first run and preserved across resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            current_phase: -1,
            completed_phases: Vec::new(),
            failed_phases: Vec::new(),
            last_checkpoint: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// A multi-phase execution plan, the central durable object.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutionPlan {
    /// Timestamp-derived token, e.g. `plan_20260802_141523`.
    pub id: String,
    pub title: String,
    pub description: String,

    /// Expected layout: directory path to ordered file names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub file_structure: BTreeMap<String, Vec<String>>,

    pub phases: Vec<Phase>,
    pub state: ExecutionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Resolve a dependency reference (phase id or name) to a phase index.
    pub fn resolve_dependency(&self, reference: &str) -> Option<usize> {
        self.phases
            .iter()
            .position(|p| p.id == reference || p.name == reference)
    }

    /// True when every `dependencies` entry of every phase names an
    /// existing phase. The executor refuses to start otherwise.
    pub fn dependencies_resolvable(&self) -> Result<(), String> {
        for phase in &self.phases {
            for dep in &phase.dependencies {
                if self.resolve_dependency(dep).is_none() {
                    return Err(format!(
                        "phase {} depends on unknown phase {:?}",
                        phase.name, dep
                    ));
                }
            }
        }
        Ok(())
    }

    /// Clear all execution progress so the plan can run again from scratch.
    ///
    /// Phase statuses return to `Pending`, task completion flags and results
    /// are wiped, and the state lists are emptied. Approval status is not
    /// touched; a reset plan still needs (or keeps) its approval.
    pub fn reset(&mut self) {
        for phase in &mut self.phases {
            phase.status = PhaseStatus::Pending;
            for task in &mut phase.tasks {
                task.completed = false;
                task.result = None;
                task.error = None;
            }
        }
        self.state.current_phase = -1;
        self.state.completed_phases.clear();
        self.state.failed_phases.clear();
        self.state.last_checkpoint = None;
        self.state.started_at = None;
        self.state.completed_at = None;
        self.updated_at = Utc::now();
    }
}

/// A marker created before a phase begins, enabling rollback.
///
/// In-memory only for now; the metadata map is the extension point for a
/// future filesystem-snapshot or VCS-backed rollback.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Checkpoint {
    pub id: String,
    pub plan_id: String,
    pub phase_index: usize,
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Knobs for plan generation.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlanPreferences {
    pub max_phases: usize,
    pub require_approval: bool,
    pub auto_execute: bool,
    pub verbose_logging: bool,
}

impl Default for PlanPreferences {
    fn default() -> Self {
        Self {
            max_phases: 10,
            require_approval: true,
            auto_execute: false,
            verbose_logging: true,
        }
    }
}
