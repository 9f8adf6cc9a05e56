//! The code specialist: implementation, debugging, refactoring.

use crate::agents::base::{
    estimate_tokens, keyword_score, run_prompt, Agent, AgentConfig, AgentError, AgentRequest,
    AgentResponse,
};
use crate::agents::tools::{AstParserTool, CodeSearchTool, LintTool, Tool};
use crate::inference::InferencePool;
use crate::llm_output::truncate;
use async_trait::async_trait;
use qf_protocol::AgentKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const CONFIDENCE: f64 = 0.9;

const HANDLE_KEYWORDS: &[&str] = &[
    "code", "function", "class", "bug", "debug", "implement", "refactor", "parse", "ast",
];

pub struct CodeAgent {
    config: AgentConfig,
    pool: Arc<InferencePool>,
    tools: Vec<Arc<dyn Tool>>,
}

impl CodeAgent {
    pub fn new(pool: Arc<InferencePool>, config: Option<AgentConfig>) -> Self {
        Self {
            config: config.unwrap_or_else(|| AgentConfig::for_kind(AgentKind::Code)),
            pool,
            tools: vec![
                Arc::new(AstParserTool),
                Arc::new(CodeSearchTool),
                Arc::new(LintTool),
            ],
        }
    }

    /// Role preamble, optional working context, recent memory snippets,
    /// then the query.
    fn build_prompt(&self, request: &AgentRequest) -> String {
        let mut prompt = String::from(
            "You are a code expert assistant. Provide accurate, well-structured code solutions.\n\n",
        );

        if let Some(ctx) = &request.context {
            if let Some(dir) = &ctx.current_dir {
                prompt.push_str(&format!("Working Directory: {dir}\n"));
            }
            if let Some(branch) = &ctx.git_branch {
                prompt.push_str(&format!("Git Branch: {branch}\n"));
            }
            if !ctx.recent_commits.is_empty() {
                prompt.push_str(&format!(
                    "Recent Commits: {}\n",
                    ctx.recent_commits.join("; ")
                ));
            }
            prompt.push('\n');
        }

        if self.config.memory_enabled && !request.memories.is_empty() {
            prompt.push_str("Relevant Context:\n");
            for memory in request.memories.iter().take(self.config.max_memory_items) {
                prompt.push_str(&format!("- {}\n", truncate(&memory.content, 100)));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Query: {}\n\nResponse:", request.query));
        prompt
    }
}

#[async_trait]
impl Agent for CodeAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Code
    }

    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let start = Instant::now();
        let prompt = self.build_prompt(request);
        let answer = run_prompt(&self.pool, &prompt, request.stream.as_ref()).await?;

        let mut metadata = HashMap::new();
        metadata.insert(
            "streaming".to_string(),
            serde_json::Value::Bool(request.stream.is_some()),
        );

        Ok(AgentResponse {
            agent_name: self.config.name.clone(),
            kind: self.kind(),
            tokens_used: estimate_tokens(&answer),
            answer,
            tool_calls: Vec::new(),
            confidence: CONFIDENCE,
            duration: start.elapsed(),
            metadata,
        })
    }

    fn can_handle(&self, query: &str) -> f64 {
        keyword_score(query, HANDLE_KEYWORDS)
    }

    fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::base::AgentContext;
    use crate::inference::{ClientConfig, PoolConfig};
    use qf_protocol::MemorySnippet;

    fn test_agent() -> CodeAgent {
        let pool = Arc::new(InferencePool::new(PoolConfig {
            workers: 1,
            queue_size: 4,
            max_concurrent: 1,
            client: ClientConfig::default(),
        }));
        CodeAgent::new(pool, None)
    }

    #[tokio::test]
    async fn prompt_includes_context_and_memories() {
        let agent = test_agent();

        let mut request = AgentRequest::new("r1", "refactor the parser").with_context(AgentContext {
            current_dir: Some("/work/proj".to_string()),
            git_branch: Some("main".to_string()),
            ..AgentContext::default()
        });
        request.memories.push(MemorySnippet {
            id: "m1".to_string(),
            content: "x".repeat(300),
            score: 0.9,
        });

        let prompt = agent.build_prompt(&request);
        assert!(prompt.contains("Working Directory: /work/proj"));
        assert!(prompt.contains("Git Branch: main"));
        assert!(prompt.contains("Relevant Context:"));
        // Snippets are clipped to 100 characters plus the marker.
        assert!(prompt.contains(&format!("- {}...", "x".repeat(100))));
        assert!(prompt.ends_with("Response:"));
    }

    #[tokio::test]
    async fn can_handle_scores_code_queries() {
        let agent = test_agent();
        assert!(agent.can_handle("debug this function") > 0.0);
        assert_eq!(agent.can_handle("order groceries"), 0.0);
    }

    #[tokio::test]
    async fn exposes_three_tools() {
        let agent = test_agent();
        let names: Vec<&str> = agent.tools().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["ast_parser", "code_search", "lint"]);
    }
}
