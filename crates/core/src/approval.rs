//! Human-in-the-loop plan approval and state persistence.
//!
//! Plans are serialized to `<state_dir>/<plan_id>.json` on every state
//! transition so an interrupted run can resume from disk. The runtime
//! manifest is not part of the snapshot.

use crate::planner::render_markdown;
use qf_protocol::{ExecutionPlan, ExecutionStatus};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("failed to read approval input: {0}")]
    Input(#[source] std::io::Error),

    #[error("failed to access plan state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plan state at {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Handles plan review and snapshotting.
pub struct ApprovalWorkflow {
    state_dir: PathBuf,
}

impl ApprovalWorkflow {
    /// Workflow over the default state directory,
    /// `~/.quantumflow/state`.
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            state_dir: home.join(".quantumflow").join("state"),
        }
    }

    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Present the plan and collect a y/N/e decision.
    ///
    /// `y`/`yes` approves the plan; `e`/`edit` is documented but not
    /// implemented and leaves the status untouched; anything else
    /// cancels. Returns whether execution may proceed.
    pub fn request(
        &self,
        plan: &mut ExecutionPlan,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Result<bool, ApprovalError> {
        let rule = "═".repeat(60);
        let _ = writeln!(output, "\n{rule}");
        let _ = writeln!(output, "PLAN REVIEW: {}", plan.title);
        let _ = writeln!(output, "{rule}");
        let _ = writeln!(output, "{}", render_markdown(plan));
        let _ = writeln!(output, "{rule}");
        let _ = writeln!(output, "\nThis plan will be executed automatically.");
        let _ = writeln!(output, "Please review carefully before approving.\n");
        let _ = write!(output, "Approve execution? [y/N/e(dit)]: ");
        let _ = output.flush();

        let mut line = String::new();
        input.read_line(&mut line).map_err(ApprovalError::Input)?;
        let answer = line.trim().to_lowercase();

        match answer.as_str() {
            "y" | "yes" => {
                plan.state.status = ExecutionStatus::Approved;
                Ok(true)
            }
            "e" | "edit" => {
                let _ = writeln!(output, "\nPlan editing not yet implemented.");
                let _ = writeln!(
                    output,
                    "For now, edit the plan file under {} and re-run.\n",
                    self.state_dir.display()
                );
                Ok(false)
            }
            _ => {
                plan.state.status = ExecutionStatus::Cancelled;
                Ok(false)
            }
        }
    }

    /// Snapshot the plan to `<state_dir>/<plan_id>.json`.
    pub fn save(&self, plan: &ExecutionPlan) -> Result<(), ApprovalError> {
        std::fs::create_dir_all(&self.state_dir).map_err(|source| ApprovalError::Io {
            path: self.state_dir.clone(),
            source,
        })?;

        let path = self.plan_path(&plan.id);
        let data = serde_json::to_string_pretty(plan).map_err(|source| ApprovalError::Corrupt {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, data).map_err(|source| ApprovalError::Io { path, source })
    }

    /// Load a previously saved plan.
    pub fn load(&self, plan_id: &str) -> Result<ExecutionPlan, ApprovalError> {
        let path = self.plan_path(plan_id);
        let data = std::fs::read_to_string(&path).map_err(|source| ApprovalError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ApprovalError::Corrupt { path, source })
    }

    /// Ids of every plan with a snapshot in the state directory.
    pub fn list_plans(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.state_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .flatten()
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        ids
    }

    /// Write the human-readable markdown copy under `plans_dir`.
    pub fn save_markdown(
        &self,
        plan: &ExecutionPlan,
        plans_dir: &Path,
    ) -> Result<PathBuf, ApprovalError> {
        std::fs::create_dir_all(plans_dir).map_err(|source| ApprovalError::Io {
            path: plans_dir.to_path_buf(),
            source,
        })?;

        let path = plans_dir.join(format!("{}.md", plan.id));
        std::fs::write(&path, render_markdown(plan)).map_err(|source| ApprovalError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn plan_path(&self, plan_id: &str) -> PathBuf {
        self.state_dir.join(format!("{plan_id}.json"))
    }
}

impl Default for ApprovalWorkflow {
    fn default() -> Self {
        Self::new()
    }
}
