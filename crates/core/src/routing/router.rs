//! Model-backed query router.
//!
//! Asks the backend to pick an agent from the closed set and parses the
//! structured verdict. The rule-based classifier stays the default; this
//! one trades latency for better handling of ambiguous phrasing.

use crate::inference::OllamaClient;
use crate::llm_output::extract_json_object;
use crate::routing::classifier::{Classifier, ClassifyError};
use async_trait::async_trait;
use qf_protocol::{AgentKind, Classification};
use serde::Deserialize;
use std::sync::Arc;

/// Router verdict wire shape.
#[derive(Deserialize, Debug)]
struct RouterVerdict {
    #[serde(default)]
    primary_agent: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    secondary_agent: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    tools_needed: Option<Vec<String>>,
}

/// Classifier that delegates routing to the backend model.
pub struct LlmRouter {
    client: Arc<OllamaClient>,
}

impl LlmRouter {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }

    fn build_prompt(query: &str) -> String {
        format!(
            r#"You are a query router for a multi-agent system. Pick the single best agent for the user query.

Agents:
- code: programming, debugging, refactoring, general software questions
- data: databases, SQL, analytics, data processing
- infra: deployment, Docker, Kubernetes, cloud infrastructure
- sec: security review, vulnerabilities, audits

Tie-breaker rules:
- Conversational, greeting or unclear queries go to "code"
- Any label outside the list above counts as "code"

User query: {query}

Respond with ONLY a JSON object:
{{"primary_agent": "code|data|infra|sec", "confidence": 0.0, "reasoning": "...", "secondary_agent": null, "tools_needed": []}}

JSON Response:"#
        )
    }

    fn parse_verdict(raw: &str) -> Result<RouterVerdict, ClassifyError> {
        let json = extract_json_object(raw).ok_or(ClassifyError::NoVerdict)?;
        serde_json::from_str(json).map_err(|_| ClassifyError::NoVerdict)
    }

    fn to_classification(label: &str, confidence: f64, reasoning: &str) -> Classification {
        Classification {
            kind: AgentKind::normalize(label),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.to_string(),
        }
    }
}

#[async_trait]
impl Classifier for LlmRouter {
    async fn classify(&self, query: &str) -> Result<(AgentKind, f64), ClassifyError> {
        let result = self
            .client
            .generate_sync(&Self::build_prompt(query))
            .await?;
        let verdict = Self::parse_verdict(&result.response)?;
        let primary =
            Self::to_classification(&verdict.primary_agent, verdict.confidence, &verdict.reasoning);
        Ok((primary.kind, primary.confidence))
    }

    async fn classify_multi(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Classification>, ClassifyError> {
        let result = self
            .client
            .generate_sync(&Self::build_prompt(query))
            .await?;
        let verdict = Self::parse_verdict(&result.response)?;

        let mut classifications = vec![Self::to_classification(
            &verdict.primary_agent,
            verdict.confidence,
            &verdict.reasoning,
        )];

        if k > 1 {
            if let Some(secondary) = &verdict.secondary_agent {
                let c = Self::to_classification(secondary, verdict.confidence * 0.5, "secondary");
                if c.kind != classifications[0].kind {
                    classifications.push(c);
                }
            }
        }

        classifications.truncate(k);
        Ok(classifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_verdict() {
        let verdict = LlmRouter::parse_verdict(
            r#"{"primary_agent": "infra", "confidence": 0.92, "reasoning": "deployment"}"#,
        )
        .unwrap();
        assert_eq!(verdict.primary_agent, "infra");
        assert!((verdict.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_fenced_verdict() {
        let raw = "```json\n{\"primary_agent\": \"sec\", \"confidence\": 0.8, \"reasoning\": \"audit\"}\n```";
        let verdict = LlmRouter::parse_verdict(raw).unwrap();
        assert_eq!(verdict.primary_agent, "sec");
    }

    #[test]
    fn prose_only_response_is_an_error() {
        assert!(LlmRouter::parse_verdict("I think the code agent fits best.").is_err());
    }

    #[test]
    fn invalid_label_normalizes_to_code() {
        let c = LlmRouter::to_classification("general-assistant", 0.7, "");
        assert_eq!(c.kind, AgentKind::Code);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(LlmRouter::to_classification("data", 1.7, "").confidence, 1.0);
        assert_eq!(LlmRouter::to_classification("data", -0.2, "").confidence, 0.0);
    }
}
