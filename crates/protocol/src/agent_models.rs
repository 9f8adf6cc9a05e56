//! Agent-facing data model: kinds, classifications, chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of specialist agents.
///
/// Every query and every plan phase is routed to exactly one of these.
/// Strings outside the set normalize to [`AgentKind::Code`], which keeps
/// model output (and hand-edited plan files) from ever producing an
/// unroutable phase.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// General programming: implementation, debugging, refactoring.
    Code,
    /// Databases, SQL and analytics.
    Data,
    /// Deployment, containers, infrastructure-as-code.
    Infra,
    /// Security review and auditing.
    Sec,
}

impl AgentKind {
    /// All kinds, in canonical (alphabetical) order.
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Code,
        AgentKind::Data,
        AgentKind::Infra,
        AgentKind::Sec,
    ];

    /// Map an arbitrary label onto the closed set.
    ///
    /// Matching is case-insensitive and tolerant of surrounding whitespace.
    /// Anything unrecognized becomes `Code`. Idempotent by construction:
    /// `normalize(x.as_str()) == x` for every kind `x`.
    pub fn normalize(label: &str) -> AgentKind {
        match label.trim().to_lowercase().as_str() {
            "data" => AgentKind::Data,
            "infra" => AgentKind::Infra,
            "sec" => AgentKind::Sec,
            _ => AgentKind::Code,
        }
    }

    /// The lowercase wire token for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Code => "code",
            AgentKind::Data => "data",
            AgentKind::Infra => "infra",
            AgentKind::Sec => "sec",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single routing decision produced by a classifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Classification {
    /// The agent kind the query was routed to.
    pub kind: AgentKind,

    /// Confidence in `[0, 1]`.
    pub confidence: f64,

    /// Free-text explanation (matched keywords, model reasoning, ...).
    pub reasoning: String,
}

/// A single message in a chat-style conversation with the backend.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    /// "user", "assistant" or "system".
    pub role: String,

    /// Message content.
    pub content: String,

    /// When the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A memory snippet retrieved for prompt enrichment.
///
/// The persistent stores behind this shape live outside the core; the
/// orchestrator only ever consumes retrieved snippets.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MemorySnippet {
    pub id: String,

    /// The stored content, injected (truncated) into agent prompts.
    pub content: String,

    /// Relevance score assigned by the retrieval layer.
    pub score: f64,
}

/// A recorded tool invocation inside an agent response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolCall {
    pub name: String,

    /// Tool parameters as free-form JSON.
    pub parameters: serde_json::Value,

    pub result: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_known_labels() {
        assert_eq!(AgentKind::normalize("code"), AgentKind::Code);
        assert_eq!(AgentKind::normalize("data"), AgentKind::Data);
        assert_eq!(AgentKind::normalize("infra"), AgentKind::Infra);
        assert_eq!(AgentKind::normalize("sec"), AgentKind::Sec);
    }

    #[test]
    fn normalize_is_case_and_whitespace_tolerant() {
        assert_eq!(AgentKind::normalize("  Data "), AgentKind::Data);
        assert_eq!(AgentKind::normalize("SEC"), AgentKind::Sec);
    }

    #[test]
    fn normalize_defaults_unknown_to_code() {
        assert_eq!(AgentKind::normalize("devops"), AgentKind::Code);
        assert_eq!(AgentKind::normalize(""), AgentKind::Code);
    }

    #[test]
    fn normalize_is_idempotent() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::normalize(kind.as_str()), kind);
        }
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_value(AgentKind::Infra).unwrap();
        assert_eq!(json, "infra");

        let back: AgentKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, AgentKind::Infra);
    }
}
