//! Shared fixtures for executor integration tests: a scripted agent and
//! plan builders.

use async_trait::async_trait;
use chrono::Utc;
use qf_core::agents::{Agent, AgentError, AgentRequest, AgentResponse, Tool};
use qf_core::orchestrator::{Orchestrator, OrchestratorConfig};
use qf_core::routing::RuleBasedClassifier;
use qf_protocol::{AgentKind, ExecutionPlan, ExecutionState, Phase, PhaseStatus, Task};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted turn of a [`ScriptedAgent`].
pub enum Reply {
    Answer(String),
    Fail(String),
}

pub fn answer(text: &str) -> Reply {
    Reply::Answer(text.to_string())
}

pub fn failure(text: &str) -> Reply {
    Reply::Fail(text.to_string())
}

/// Agent that replays a fixed script of replies.
///
/// Once the script is exhausted it answers `"done"`; `calls` counts every
/// execution so tests can assert which phases actually ran.
pub struct ScriptedAgent {
    kind: AgentKind,
    name: String,
    script: Mutex<VecDeque<Reply>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedAgent {
    pub fn new(kind: AgentKind, script: Vec<Reply>) -> Self {
        Self {
            kind,
            name: format!("scripted-{kind}"),
            script: Mutex::new(script.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn execute(&self, _request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let reply = self.script.lock().unwrap().pop_front();
        let answer = match reply {
            Some(Reply::Answer(text)) => text,
            Some(Reply::Fail(reason)) => return Err(AgentError::InvalidParams(reason)),
            None => "done".to_string(),
        };

        Ok(AgentResponse {
            agent_name: self.name.clone(),
            kind: self.kind,
            tokens_used: answer.len() / 4,
            answer,
            tool_calls: Vec::new(),
            confidence: 0.9,
            duration: Duration::ZERO,
            metadata: Default::default(),
        })
    }

    fn can_handle(&self, _query: &str) -> f64 {
        0.9
    }

    fn tools(&self) -> &[Arc<dyn Tool>] {
        &[]
    }
}

/// Orchestrator with the given agents registered and the rule-based
/// classifier.
pub fn orchestrator_with(agents: Vec<Arc<dyn Agent>>) -> Arc<Orchestrator> {
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Box::new(RuleBasedClassifier::new()),
    );
    for agent in agents {
        orchestrator.register(agent).expect("register agent");
    }
    Arc::new(orchestrator)
}

pub fn make_phase(id: &str, name: &str, kind: AgentKind, deps: &[&str]) -> Phase {
    Phase {
        id: id.to_string(),
        name: name.to_string(),
        agent: kind,
        tasks: vec![Task {
            id: format!("{id}-task-1"),
            description: format!("work on {name}"),
            completed: false,
            result: None,
            error: None,
        }],
        success_criteria: "it works".to_string(),
        estimated_time: "5 minutes".to_string(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        status: PhaseStatus::Pending,
    }
}

pub fn make_plan(id: &str, phases: Vec<Phase>) -> ExecutionPlan {
    ExecutionPlan {
        id: id.to_string(),
        title: "test plan".to_string(),
        description: "plan used in tests".to_string(),
        file_structure: Default::default(),
        phases,
        state: ExecutionState::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
