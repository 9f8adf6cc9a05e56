//! Query classification.
//!
//! Two interchangeable implementations sit behind the [`Classifier`]
//! trait: a keyword scorer that needs no model round-trip, and the
//! model-backed router in [`crate::routing::router`].

use async_trait::async_trait;
use qf_protocol::{AgentKind, Classification};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("router inference failed: {0}")]
    Inference(#[from] crate::inference::ClientError),

    #[error("router returned no parseable verdict")]
    NoVerdict,
}

/// Maps a free-text query to an agent kind with a confidence score.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Best agent kind for the query.
    async fn classify(&self, query: &str) -> Result<(AgentKind, f64), ClassifyError>;

    /// Top-k candidate kinds, best first.
    async fn classify_multi(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Classification>, ClassifyError>;
}

/// Keyword-based classifier.
///
/// Score per kind is `matches / words + 0.1 * matches`, capped at 1.0.
/// A keyword matches a word when either string contains the other.
/// No match at all defaults to `(Code, 0.3)`.
pub struct RuleBasedClassifier {
    // BTreeMap keeps iteration order fixed, so equal scores break ties
    // alphabetically on kind.
    rules: BTreeMap<AgentKind, Vec<&'static str>>,
}

impl RuleBasedClassifier {
    pub fn new() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            AgentKind::Code,
            vec![
                "code", "function", "class", "debug", "refactor", "bug", "implement", "parse",
                "ast", "syntax", "compile", "test", "method", "variable", "import", "package",
                "module", "golang", "python", "javascript", "typescript", "java", "error",
                "exception", "stacktrace", "lint",
            ],
        );
        rules.insert(
            AgentKind::Data,
            vec![
                "data", "database", "sql", "query", "table", "schema", "analytics", "pandas",
                "dataframe", "csv", "json", "aggregate", "group", "join", "select", "insert",
                "update", "delete", "migration", "index", "postgres", "mysql", "mongodb", "redis",
                "statistics", "chart",
            ],
        );
        rules.insert(
            AgentKind::Infra,
            vec![
                "deploy", "infrastructure", "server", "container", "docker", "kubernetes", "k8s",
                "terraform", "ansible", "aws", "gcp", "azure", "cloud", "scaling",
                "load balancer", "nginx", "service", "pod", "node", "cluster", "helm", "vpc",
                "network", "firewall", "instance", "vm",
            ],
        );
        rules.insert(
            AgentKind::Sec,
            vec![
                "security", "vulnerability", "cve", "owasp", "xss", "sql injection", "csrf",
                "authentication", "authorization", "encryption", "decrypt", "certificate", "ssl",
                "tls", "firewall", "audit", "compliance", "pen test", "scan", "malware", "threat",
                "attack", "breach", "exploit",
            ],
        );
        Self { rules }
    }

    /// Extend the keyword table for a kind.
    pub fn add_rule(&mut self, kind: AgentKind, keywords: Vec<&'static str>) {
        self.rules.entry(kind).or_default().extend(keywords);
    }

    fn score(&self, query: &str) -> Vec<Classification> {
        let query = query.to_lowercase();
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let mut classifications = Vec::new();
        for (&kind, keywords) in &self.rules {
            let mut matched = Vec::new();
            for keyword in keywords {
                if words
                    .iter()
                    .any(|word| word.contains(keyword) || keyword.contains(word))
                {
                    matched.push(*keyword);
                }
            }

            if matched.is_empty() {
                continue;
            }

            let matches = matched.len() as f64;
            let score = (matches / words.len() as f64 + matches * 0.1).min(1.0);
            classifications.push(Classification {
                kind,
                confidence: score,
                reasoning: format!("Matched keywords: {}", matched.join(", ")),
            });
        }

        // Descending score; the BTreeMap iteration above already ordered
        // equal scores alphabetically, and the stable sort keeps that.
        classifications.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        classifications
    }
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for RuleBasedClassifier {
    async fn classify(&self, query: &str) -> Result<(AgentKind, f64), ClassifyError> {
        let classifications = self.classify_multi(query, 1).await?;
        match classifications.first() {
            Some(c) => Ok((c.kind, c.confidence)),
            None => Ok((AgentKind::Code, 0.3)),
        }
    }

    async fn classify_multi(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Classification>, ClassifyError> {
        let mut classifications = self.score(query);
        classifications.truncate(k);
        Ok(classifications)
    }
}
