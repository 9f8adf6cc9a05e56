//! Specialist agents and their supporting types.

pub mod base;
pub mod code;
pub mod data;
pub mod infra;
pub mod sec;
pub mod tools;

pub use base::{Agent, AgentConfig, AgentContext, AgentError, AgentRequest, AgentResponse};
pub use code::CodeAgent;
pub use data::DataAgent;
pub use infra::InfraAgent;
pub use sec::SecAgent;
pub use tools::Tool;

use crate::inference::InferencePool;
use std::sync::Arc;

/// The four specialists over a shared pool, ready for registration.
pub fn default_agents(pool: Arc<InferencePool>) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(CodeAgent::new(Arc::clone(&pool), None)),
        Arc::new(DataAgent::new(Arc::clone(&pool), None)),
        Arc::new(InfraAgent::new(Arc::clone(&pool), None)),
        Arc::new(SecAgent::new(pool, None)),
    ]
}
