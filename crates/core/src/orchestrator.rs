//! Agent orchestration: registry, routing, execution, conflict resolution.

use crate::agents::{Agent, AgentRequest, AgentResponse};
use crate::memory::MemoryService;
use crate::routing::cache::RoutingCache;
use crate::routing::classifier::{Classifier, ClassifyError};
use qf_protocol::AgentKind;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How many memory snippets the orchestrator injects per request.
const MEMORY_TOP_K: usize = 5;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("agent of kind {0} already registered")]
    DuplicateAgent(AgentKind),

    #[error("no agent registered for kind {kind} (confidence: {confidence:.2})")]
    NoAgentForKind { kind: AgentKind, confidence: f64 },

    #[error("classification failed: {0}")]
    Classification(#[from] ClassifyError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("agent {name} failed: {source}")]
    AgentFailed {
        name: String,
        #[source]
        source: crate::agents::AgentError,
    },

    #[error("no agents available to handle query")]
    NoAgents,
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub parallel_execution: bool,
    pub conflict_resolution: bool,
    pub max_agents_per_query: usize,
    pub default_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_execution: false,
            conflict_resolution: true,
            max_agents_per_query: 1,
            default_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Reconciles contradictory outputs from multiple agents.
pub trait ConflictResolver: Send + Sync {
    /// Conflict heuristic over a batch of responses.
    fn detect_conflict(&self, responses: &[AgentResponse]) -> bool;

    /// Pick (or synthesize) a winner. `responses` is non-empty.
    fn resolve(&self, responses: Vec<AgentResponse>) -> AgentResponse;
}

/// Default resolver: a wide confidence spread marks a conflict and the
/// most confident response wins.
pub struct ConfidenceResolver;

impl ConflictResolver for ConfidenceResolver {
    fn detect_conflict(&self, responses: &[AgentResponse]) -> bool {
        if responses.len() < 2 {
            return false;
        }
        let min = responses
            .iter()
            .map(|r| r.confidence)
            .fold(f64::INFINITY, f64::min);
        let max = responses
            .iter()
            .map(|r| r.confidence)
            .fold(f64::NEG_INFINITY, f64::max);
        max - min > 0.3
    }

    fn resolve(&self, mut responses: Vec<AgentResponse>) -> AgentResponse {
        let mut best = 0;
        for (i, response) in responses.iter().enumerate() {
            if response.confidence > responses[best].confidence {
                best = i;
            }
        }
        responses.swap_remove(best)
    }
}

/// Manages the agent registry and routes queries through it.
pub struct Orchestrator {
    agents: RwLock<HashMap<AgentKind, Arc<dyn Agent>>>,
    classifier: Box<dyn Classifier>,
    resolver: Box<dyn ConflictResolver>,
    memory: Option<Arc<dyn MemoryService>>,
    cache: Option<RoutingCache>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, classifier: Box<dyn Classifier>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            classifier,
            resolver: Box::new(ConfidenceResolver),
            memory: None,
            cache: None,
            config,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Cache routing decisions for `ttl`. Worth it when the classifier is
    /// model-backed; the rule-based one is cheap enough without.
    pub fn with_routing_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(RoutingCache::new(ttl));
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Add an agent to the registry. One agent per kind.
    pub fn register(&self, agent: Arc<dyn Agent>) -> Result<(), OrchestratorError> {
        let mut agents = self.agents.write().unwrap();
        let kind = agent.kind();
        if agents.contains_key(&kind) {
            return Err(OrchestratorError::DuplicateAgent(kind));
        }
        agents.insert(kind, agent);
        Ok(())
    }

    /// Snapshot of all registered agents.
    pub fn agents(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().unwrap().values().cloned().collect()
    }

    /// The registered agent for `kind`, if any.
    pub fn agent_for(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        self.agents.read().unwrap().get(&kind).cloned()
    }

    /// Determine which agent(s) should handle a query.
    ///
    /// Single-element today; the multi-agent policy hook is
    /// `max_agents_per_query`.
    pub async fn route(&self, query: &str) -> Result<Vec<Arc<dyn Agent>>, OrchestratorError> {
        let (kind, confidence) = match self.cache.as_ref().and_then(|c| c.get(query)) {
            Some(hit) => (hit.kind, hit.confidence),
            None => {
                let (kind, confidence) = self.classifier.classify(query).await?;
                if let Some(cache) = &self.cache {
                    cache.set(query, kind, confidence);
                }
                (kind, confidence)
            }
        };

        match self.agent_for(kind) {
            Some(agent) => Ok(vec![agent]),
            None => Err(OrchestratorError::NoAgentForKind { kind, confidence }),
        }
    }

    /// Run a request through the appropriate agent(s).
    pub async fn execute(
        &self,
        mut request: AgentRequest,
    ) -> Result<AgentResponse, OrchestratorError> {
        let start = Instant::now();
        let timeout = request.timeout.unwrap_or(self.config.default_timeout);
        request.timeout = Some(timeout);

        match tokio::time::timeout(timeout, self.execute_inner(request)).await {
            Ok(result) => result.map(|mut response| {
                response.duration = start.elapsed();
                response
            }),
            Err(_) => Err(OrchestratorError::Timeout(timeout)),
        }
    }

    async fn execute_inner(
        &self,
        mut request: AgentRequest,
    ) -> Result<AgentResponse, OrchestratorError> {
        // Enrich with memory unless the caller already supplied snippets.
        if let Some(memory) = &self.memory {
            if request.memories.is_empty() {
                match memory.retrieve(&request.query, MEMORY_TOP_K).await {
                    Ok(snippets) => request.memories = snippets,
                    Err(err) => {
                        tracing::debug!(error = %err, "memory retrieval failed, continuing without");
                    }
                }
            }
        }

        let agents = self.route(&request.query).await?;
        if agents.is_empty() {
            return Err(OrchestratorError::NoAgents);
        }

        let responses = if self.config.parallel_execution && agents.len() > 1 {
            self.execute_parallel(agents, &request).await?
        } else {
            self.execute_sequential(agents, &request).await?
        };

        if responses.len() == 1 {
            let mut responses = responses;
            return Ok(responses.remove(0));
        }

        if self.config.conflict_resolution && self.resolver.detect_conflict(&responses) {
            Ok(self.resolver.resolve(responses))
        } else {
            let mut responses = responses;
            Ok(responses.remove(0))
        }
    }

    async fn execute_sequential(
        &self,
        agents: Vec<Arc<dyn Agent>>,
        request: &AgentRequest,
    ) -> Result<Vec<AgentResponse>, OrchestratorError> {
        let mut responses = Vec::with_capacity(agents.len());
        for agent in agents {
            let response = agent.execute(request).await.map_err(|source| {
                OrchestratorError::AgentFailed {
                    name: agent.name().to_string(),
                    source,
                }
            })?;
            responses.push(response);
        }
        Ok(responses)
    }

    /// Run agents concurrently, collecting responses and errors
    /// positionally. An error is returned only when no agent produced a
    /// response.
    async fn execute_parallel(
        &self,
        agents: Vec<Arc<dyn Agent>>,
        request: &AgentRequest,
    ) -> Result<Vec<AgentResponse>, OrchestratorError> {
        let mut handles = Vec::with_capacity(agents.len());
        for agent in agents {
            let request = request.clone();
            handles.push(tokio::spawn(async move {
                let name = agent.name().to_string();
                (name, agent.execute(&request).await)
            }));
        }

        let mut responses = Vec::new();
        let mut first_error: Option<OrchestratorError> = None;
        for handle in handles {
            match handle.await {
                Ok((_, Ok(response))) => responses.push(response),
                Ok((name, Err(source))) => {
                    if first_error.is_none() {
                        first_error = Some(OrchestratorError::AgentFailed { name, source });
                    }
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "agent task panicked");
                }
            }
        }

        if responses.is_empty() {
            Err(first_error.unwrap_or(OrchestratorError::NoAgents))
        } else {
            Ok(responses)
        }
    }
}
