//! Error types for the inference subsystem.

use thiserror::Error;

/// Errors surfaced by the backend client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The HTTP request never completed (connection refused, DNS, abort).
    #[error("backend request failed: {0}")]
    Connection(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body did not parse as the expected JSON shape.
    #[error("failed to decode backend response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors surfaced by the worker pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The bounded request queue is full; submission fails fast.
    #[error("queue full")]
    QueueFull,

    /// The request was cancelled (deadline passed) before or during
    /// processing.
    #[error("request cancelled")]
    Cancelled,

    /// The pool is shut down and no longer accepts requests.
    #[error("pool is shut down")]
    Closed,

    /// Workers did not drain within the shutdown timeout.
    #[error("shutdown timeout exceeded")]
    ShutdownTimeout,

    /// The worker's reply channel was dropped before a result arrived.
    #[error("result channel closed before completion")]
    ReplyDropped,

    /// The backend call itself failed; never retried by the pool.
    #[error("inference failed: {0}")]
    Inference(#[from] ClientError),
}
