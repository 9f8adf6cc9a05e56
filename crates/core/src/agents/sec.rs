//! The security specialist: review, audits, vulnerability analysis.

use crate::agents::base::{
    estimate_tokens, keyword_score, run_prompt, Agent, AgentConfig, AgentError, AgentRequest,
    AgentResponse,
};
use crate::agents::tools::{OwaspCheckerTool, SecurityAuditTool, Tool, VulnerabilityScannerTool};
use crate::inference::InferencePool;
use async_trait::async_trait;
use qf_protocol::AgentKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const CONFIDENCE: f64 = 0.9;

const HANDLE_KEYWORDS: &[&str] = &["security", "vulnerability", "owasp", "audit", "exploit"];

pub struct SecAgent {
    config: AgentConfig,
    pool: Arc<InferencePool>,
    tools: Vec<Arc<dyn Tool>>,
}

impl SecAgent {
    pub fn new(pool: Arc<InferencePool>, config: Option<AgentConfig>) -> Self {
        Self {
            config: config.unwrap_or_else(|| AgentConfig::for_kind(AgentKind::Sec)),
            pool,
            tools: vec![
                Arc::new(VulnerabilityScannerTool),
                Arc::new(OwaspCheckerTool),
                Arc::new(SecurityAuditTool),
            ],
        }
    }
}

#[async_trait]
impl Agent for SecAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Sec
    }

    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let start = Instant::now();
        let prompt = format!(
            "You are a security expert. Analyze and provide security recommendations.\n\nQuery: {}\n\nResponse:",
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
