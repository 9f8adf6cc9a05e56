//! The infrastructure specialist: deployment, containers, IaC.

use crate::agents::base::{
    estimate_tokens, keyword_score, run_prompt, Agent, AgentConfig, AgentError, AgentRequest,
    AgentResponse,
};
use crate::agents::tools::{DockerTool, KubectlTool, TerraformTool, Tool};
use crate::inference::InferencePool;
use async_trait::async_trait;
use qf_protocol::AgentKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const CONFIDENCE: f64 = 0.8;

const HANDLE_KEYWORDS: &[&str] = &["deploy", "docker", "kubernetes", "terraform", "infrastructure"];

pub struct InfraAgent {
    config: AgentConfig,
    pool: Arc<InferencePool>,
    tools: Vec<Arc<dyn Tool>>,
}

impl InfraAgent {
    pub fn new(pool: Arc<InferencePool>, config: Option<AgentConfig>) -> Self {
        Self {
            config: config.unwrap_or_else(|| AgentConfig::for_kind(AgentKind::Infra)),
            pool,
            tools: vec![
                Arc::new(DockerTool),
                Arc::new(KubectlTool),
                Arc::new(TerraformTool),
            ],
        }
    }
}

#[async_trait]
impl Agent for InfraAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Infra
    }

    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let start = Instant::now();
        let prompt = format!(
            "You are an infrastructure expert. Help with deployment and infra tasks.\n\nQuery: {}\n\nResponse:",
            request.query
        );
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
