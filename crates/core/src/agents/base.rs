//! Base Agent trait and supporting types.

use crate::inference::{ClientError, InferencePool, PoolError};
use async_trait::async_trait;
use qf_protocol::{AgentKind, MemorySnippet, ToolCall};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Contextual information passed to agents during execution.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub current_dir: Option<String>,
    pub git_branch: Option<String>,
    pub recent_commits: Vec<String>,
    pub open_files: Vec<String>,
    pub environment: HashMap<String, String>,
}

/// A request sent to an agent.
#[derive(Clone)]
pub struct AgentRequest {
    pub id: String,
    pub query: String,
    pub context: Option<AgentContext>,

    /// Memory snippets injected by the orchestrator. Agents truncate each
    /// to 100 characters when building the prompt.
    pub memories: Vec<MemorySnippet>,

    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,

    /// Overall deadline, applied by whoever drives the agent.
    pub timeout: Option<Duration>,

    /// When present, generation runs in streaming mode and every token
    /// fragment is forwarded into this sink as it arrives.
    pub stream: Option<mpsc::Sender<String>>,
}

impl AgentRequest {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            context: None,
            memories: Vec::new(),
            max_tokens: None,
            temperature: None,
            timeout: None,
            stream: None,
        }
    }

    pub fn with_context(mut self, context: AgentContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_stream(mut self, sink: mpsc::Sender<String>) -> Self {
        self.stream = Some(sink);
        self
    }
}

/// An agent's answer plus execution metadata.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub agent_name: String,
    pub kind: AgentKind,
    pub answer: String,
    pub tool_calls: Vec<ToolCall>,
    pub confidence: f64,
    pub duration: Duration,
    pub tokens_used: usize,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("generation failed: {0}")]
    Pool(#[from] PoolError),

    #[error("generation failed: {0}")]
    Client(#[from] ClientError),

    #[error("invalid tool parameters: {0}")]
    InvalidParams(String),
}

/// A specialized agent for one [`AgentKind`].
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> AgentKind;

    /// Run the request through the backend and package the answer.
    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError>;

    /// Self-assessed fitness for a query in `[0, 1]`.
    fn can_handle(&self, query: &str) -> f64;

    /// The agent's static tool list. Tools are placeholders surfaced to
    /// higher layers; the core never invokes them on its own.
    fn tools(&self) -> &[Arc<dyn crate::agents::tools::Tool>];
}

impl std::fmt::Debug for dyn Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Per-agent tuning knobs.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub kind: AgentKind,
    pub temperature: f64,
    pub memory_enabled: bool,
    pub max_memory_items: usize,
}

impl AgentConfig {
    pub fn for_kind(kind: AgentKind) -> Self {
        let (name, temperature) = match kind {
            AgentKind::Code => ("CodeAgent", 0.3),
            AgentKind::Data => ("DataAgent", 0.4),
            AgentKind::Infra => ("InfraAgent", 0.5),
            AgentKind::Sec => ("SecAgent", 0.3),
        };
        Self {
            name: name.to_string(),
            kind,
            temperature,
            memory_enabled: true,
            max_memory_items: 10,
        }
    }
}

/// Rough token estimate used for response metadata.
pub(crate) fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Run one prompt through the pool, streaming into `sink` when present.
///
/// Streaming goes through the pool's client so tokens reach the sink as
/// they arrive; the synchronous path rides the bounded queue.
pub(crate) async fn run_prompt(
    pool: &InferencePool,
    prompt: &str,
    sink: Option<&mpsc::Sender<String>>,
) -> Result<String, AgentError> {
    match sink {
        Some(sink) => {
            let mut tokens = pool.client().generate(prompt, true).await?;
            let mut answer = String::new();
            while let Some(token) = tokens.recv().await {
                answer.push_str(&token);
                if sink.send(token).await.is_err() {
                    // Consumer went away; keep accumulating the answer.
                    break;
                }
            }
            // Drain whatever the consumer did not take.
            while let Some(token) = tokens.recv().await {
                answer.push_str(&token);
            }
            Ok(answer)
        }
        None => {
            let result = pool.submit_sync(prompt, 0).await?;
            Ok(result.response)
        }
    }
}

/// Keyword-overlap fitness used by the `can_handle` implementations.
pub(crate) fn keyword_score(query: &str, keywords: &[&str]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let query = query.to_lowercase();
    let matches = keywords.iter().filter(|kw| query.contains(*kw)).count();
    matches as f64 / keywords.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_is_len_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn keyword_score_counts_matches() {
        let score = keyword_score("debug the code", &["code", "debug", "sql", "docker"]);
        assert!((score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn request_builder_sets_fields() {
        let req = AgentRequest::new("r1", "fix it").with_timeout(Duration::from_secs(5));
        assert_eq!(req.id, "r1");
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
        assert!(req.stream.is_none());
        assert!(req.memories.is_empty());
    }

    #[test]
    fn config_defaults_per_kind() {
        let config = AgentConfig::for_kind(AgentKind::Data);
        assert_eq!(config.name, "DataAgent");
        assert_eq!(config.kind, AgentKind::Data);
        assert!((config.temperature - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.max_memory_items, 10);
    }
}
