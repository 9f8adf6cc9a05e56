//! The abstract memory interface the orchestrator consumes.
//!
//! The persistent stores (episodic vectors, semantic graph, procedural
//! patterns) live outside this crate; the core only ever asks for the
//! snippets most relevant to a query.

use async_trait::async_trait;
use qf_protocol::MemorySnippet;

/// Retrieval over whatever memory backend is wired in.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// The `limit` most relevant snippets for `query`, best first.
    async fn retrieve(&self, query: &str, limit: usize) -> anyhow::Result<Vec<MemorySnippet>>;
}
