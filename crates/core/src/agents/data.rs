//! The data specialist: SQL, analytics, schema work.

use crate::agents::base::{
    estimate_tokens, keyword_score, run_prompt, Agent, AgentConfig, AgentError, AgentRequest,
    AgentResponse,
};
use crate::agents::tools::{DataAnalysisTool, SchemaInspectorTool, SqlGeneratorTool, Tool};
use crate::inference::InferencePool;
use crate::llm_output::truncate;
use async_trait::async_trait;
use qf_protocol::AgentKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const CONFIDENCE: f64 = 0.85;

const HANDLE_KEYWORDS: &[&str] = &["data", "sql", "query", "table", "database", "analytics"];

pub struct DataAgent {
    config: AgentConfig,
    pool: Arc<InferencePool>,
    tools: Vec<Arc<dyn Tool>>,
}

impl DataAgent {
    pub fn new(pool: Arc<InferencePool>, config: Option<AgentConfig>) -> Self {
        Self {
            config: config.unwrap_or_else(|| AgentConfig::for_kind(AgentKind::Data)),
            pool,
            tools: vec![
                Arc::new(SqlGeneratorTool),
                Arc::new(DataAnalysisTool),
                Arc::new(SchemaInspectorTool),
            ],
        }
    }

    fn build_prompt(&self, request: &AgentRequest) -> String {
        let mut prompt =
            String::from("You are a data analysis expert. Provide SQL queries and data insights.\n\n");

        if !request.memories.is_empty() {
            prompt.push_str("Context:\n");
            for memory in request.memories.iter().take(self.config.max_memory_items) {
                prompt.push_str(&format!("- {}\n", truncate(&memory.content, 100)));
            }
        }

        prompt.push_str(&format!("\nQuery: {}\n\nResponse:", request.query));
        prompt
    }
}

#[async_trait]
impl Agent for DataAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Data
    }

    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let start = Instant::now();
        let prompt = self.build_prompt(request);
        let answer = run_prompt(&self.pool, &prompt, request.stream.as_ref()).await?;

        Ok(AgentResponse {
            agent_name: self.config.name.clone(),
            kind: self.kind(),
            tokens_used: estimate_tokens(&answer),
            answer,
            tool_calls: Vec::new(),
            confidence: CONFIDENCE,
            duration: start.elapsed(),
            metadata: HashMap::new(),
        })
    }

    fn can_handle(&self, query: &str) -> f64 {
        keyword_score(query, HANDLE_KEYWORDS)
    }

    fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }
}
