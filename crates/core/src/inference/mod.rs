//! Inference subsystem: backend client and bounded worker pool.

pub mod client;
pub mod error;
pub mod pool;

pub use client::{ClientConfig, InferenceResult, OllamaClient};
pub use error::{ClientError, PoolError};
pub use pool::{InferencePool, PoolConfig, PoolMetrics, PoolRequest};
