//! Runtime ledger of files created during plan execution.
//!
//! The manifest enables context propagation between phases and enforces
//! the no-overwrite rule within a single run. It is rebuilt whenever
//! execution starts; only the expected structure is seeded from the plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A single file created during execution.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    /// Name of the phase that created the file.
    pub phase: String,
    pub purpose: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Tracks all files created during plan execution.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProjectManifest {
    pub project_name: String,
    pub base_dir: PathBuf,
    pub created_files: Vec<FileEntry>,
    /// Directory path to file names, seeded from the plan and extended
    /// as files land.
    pub file_structure: BTreeMap<String, Vec<String>>,
}

impl ProjectManifest {
    pub fn new(project_name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_name: project_name.into(),
            base_dir: base_dir.into(),
            created_files: Vec::new(),
            file_structure: BTreeMap::new(),
        }
    }

    /// Record a newly created file.
    ///
    /// `path` is relative to the base directory; the entry's size comes
    /// from a stat of the file on disk (zero when unreadable).
    pub fn add_file(&mut self, path: &str, phase: &str, purpose: &str) {
        let size = std::fs::metadata(self.base_dir.join(path))
            .map(|meta| meta.len())
            .unwrap_or(0);

        self.created_files.push(FileEntry {
            path: path.to_string(),
            phase: phase.to_string(),
            purpose: purpose.to_string(),
            size,
            created_at: Utc::now(),
        });

        let parent = Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        self.file_structure.entry(parent).or_default().push(name);
    }

    /// Whether `path` was already created during this run.
    pub fn file_exists(&self, path: &str) -> bool {
        self.created_files.iter().any(|f| f.path == path)
    }

    /// Prompt-embeddable list of files created so far.
    pub fn created_files_context(&self) -> String {
        if self.created_files.is_empty() {
            return String::new();
        }

        let mut out = String::from("ALREADY CREATED FILES (do NOT overwrite):\n");
        for file in &self.created_files {
            out.push_str(&format!("  - {} (phase: {})\n", file.path, file.phase));
        }
        out
    }

    /// Prompt-embeddable rendering of the expected layout.
    pub fn file_structure_context(&self) -> String {
        if self.file_structure.is_empty() {
            return String::new();
        }

        let mut out = String::from("PROJECT FILE STRUCTURE:\n");
        for (dir, files) in &self.file_structure {
            out.push_str(&format!("  {}/\n", dir.trim_end_matches('/')));
            for file in files {
                out.push_str(&format!("    - {file}\n"));
            }
        }
        out
    }

    /// Replace the expected layout with the plan's declaration.
    pub fn set_expected_structure(&mut self, structure: BTreeMap<String, Vec<String>>) {
        self.file_structure = structure;
    }

    /// Create every declared directory under the base dir.
    pub fn initialize_directories(&self) -> std::io::Result<()> {
        for dir in self.file_structure.keys() {
            let trimmed = dir.trim_end_matches('/');
            if trimmed.is_empty() || trimmed == "." {
                continue;
            }
            std::fs::create_dir_all(self.base_dir.join(trimmed))?;
        }
        Ok(())
    }

    /// Write the manifest itself as JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, data)
    }

    /// Load a manifest previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
