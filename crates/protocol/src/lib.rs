//! # qf-protocol
//!
//! Shared data model for the QuantumFlow agent runtime.
//!
//! This crate defines the serde value types exchanged between the planner,
//! the executor and the persistence layer:
//!
//! - [`agent_models`]: agent kinds, classification results, chat messages
//! - [`plan_models`]: execution plans, phases, tasks and their state machine
//!
//! ## Design Principles
//!
//! - Minimal dependencies: only serde and chrono
//! - No I/O and no async: everything here is plain data that can be
//!   snapshotted to disk and reloaded for resume
//! - Independent compilation: no dependencies on other workspace crates

pub mod agent_models;
pub mod plan_models;

pub use agent_models::{AgentKind, Classification, MemorySnippet, Message, ToolCall};
pub use plan_models::{
    Checkpoint, ExecutionPlan, ExecutionState, ExecutionStatus, Phase, PhaseStatus,
    PlanPreferences, Task,
};
