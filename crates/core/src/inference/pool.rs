//! Bounded worker pool fronting the backend client.
//!
//! Two-level concurrency model: a fixed worker fleet consumes a bounded
//! FIFO queue, and a semaphore sized to the backend's effective
//! parallelism is acquired inside each worker before the actual call.
//! Queue admission never blocks; a full queue fails fast.

use crate::inference::client::{ClientConfig, InferenceResult, OllamaClient};
use crate::inference::error::PoolError;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker task count. Defaults to twice the CPU count.
    pub workers: usize,
    /// Request queue capacity.
    pub queue_size: usize,
    /// Maximum concurrent backend calls, independent of worker count.
    pub max_concurrent: usize,
    pub client: ClientConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        Self {
            workers: cpus * 2,
            queue_size: 1000,
            // Matches typical backend defaults.
            max_concurrent: 4,
            client: ClientConfig::default(),
        }
    }
}

/// One queued inference request.
pub struct PoolRequest {
    pub id: Uuid,
    pub prompt: String,
    /// Accepted but inert: the queue is strictly FIFO. Kept in the
    /// contract for a future priority queue.
    pub priority: i32,
    /// Absolute cancellation deadline. A request past its deadline is
    /// rejected at submission and abandoned at the semaphore.
    pub deadline: Option<Instant>,
    /// Single-shot delivery channel for the result.
    pub reply: oneshot::Sender<Result<InferenceResult, PoolError>>,
}

impl PoolRequest {
    pub fn new(
        prompt: impl Into<String>,
        priority: i32,
        reply: oneshot::Sender<Result<InferenceResult, PoolError>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            priority,
            deadline: None,
            reply,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Point-in-time performance counters.
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub total_requests: u64,
    pub completed_ok: u64,
    pub completed_error: u64,
    pub total_latency: Duration,
    /// `total_latency / completed_ok`; zero while nothing has succeeded.
    pub average_latency: Duration,
    pub current_inflight: usize,
}

/// Worker fleet plus concurrency semaphore over one [`OllamaClient`].
pub struct InferencePool {
    client: Arc<OllamaClient>,
    queue: Mutex<Option<mpsc::Sender<PoolRequest>>>,
    queue_size: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<RwLock<PoolMetrics>>,
}

impl InferencePool {
    pub fn new(config: PoolConfig) -> Self {
        let client = Arc::new(OllamaClient::new(config.client.clone()));
        let (tx, rx) = mpsc::channel::<PoolRequest>(config.queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        let metrics = Arc::new(RwLock::new(PoolMetrics::default()));

        let mut workers = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            workers.push(tokio::spawn(worker_loop(
                Arc::clone(&client),
                Arc::clone(&rx),
                Arc::clone(&semaphore),
                Arc::clone(&metrics),
            )));
        }

        Self {
            client,
            queue: Mutex::new(Some(tx)),
            queue_size: config.queue_size,
            workers: Mutex::new(workers),
            semaphore,
            metrics,
        }
    }

    /// The client behind the pool. Streaming consumers go through here;
    /// the queue only carries synchronous generations.
    pub fn client(&self) -> Arc<OllamaClient> {
        Arc::clone(&self.client)
    }

    /// Enqueue a request without waiting.
    ///
    /// Fails fast with [`PoolError::QueueFull`] when the queue is at
    /// capacity, and with [`PoolError::Cancelled`] when the request's
    /// deadline has already passed.
    pub fn submit(&self, req: PoolRequest) -> Result<(), PoolError> {
        if req.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(PoolError::Cancelled);
        }

        let guard = self.queue.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return Err(PoolError::Closed);
        };
        match tx.try_send(req) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(PoolError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::Closed),
        }
    }

    /// Enqueue a request and await its completion.
    ///
    /// `priority` is recorded but does not reorder the FIFO queue.
    pub async fn submit_sync(
        &self,
        prompt: &str,
        priority: i32,
    ) -> Result<InferenceResult, PoolError> {
        let (tx, rx) = oneshot::channel();
        self.submit(PoolRequest::new(prompt, priority, tx))?;

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(PoolError::ReplyDropped),
        }
    }

    /// Requests currently sitting in the queue.
    pub fn queue_len(&self) -> usize {
        let guard = self.queue.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => self.queue_size - tx.capacity(),
            None => 0,
        }
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.metrics.read().unwrap().clone()
    }

    /// Close the queue and wait for in-flight work.
    ///
    /// Workers finish whatever they already pulled; if they do not drain
    /// within `timeout` they are aborted and [`PoolError::ShutdownTimeout`]
    /// is returned.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), PoolError> {
        // Dropping the last sender closes the queue.
        self.queue.lock().unwrap().take();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain(..).collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let drained = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(timeout, drained).await {
            Ok(()) => Ok(()),
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                Err(PoolError::ShutdownTimeout)
            }
        }
    }

    /// Permits currently available on the backend semaphore.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

async fn worker_loop(
    client: Arc<OllamaClient>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PoolRequest>>>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<RwLock<PoolMetrics>>,
) {
    loop {
        let req = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(req) = req else {
            // Queue closed and drained.
            return;
        };
        process_request(&client, &semaphore, &metrics, req).await;
    }
}

async fn process_request(
    client: &OllamaClient,
    semaphore: &Semaphore,
    metrics: &RwLock<PoolMetrics>,
    req: PoolRequest,
) {
    // A cancelled semaphore wait completes the request with the
    // cancellation error; nothing was sent to the backend.
    let _permit = match req.deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            _ => {
                let _ = req.reply.send(Err(PoolError::Cancelled));
                return;
            }
        },
        None => match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let _ = req.reply.send(Err(PoolError::Cancelled));
                return;
            }
        },
    };

    metrics.write().unwrap().current_inflight += 1;

    let start = Instant::now();
    let outcome = match req.deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, client.generate_sync(&req.prompt)).await
        {
            Ok(result) => result.map_err(PoolError::from),
            Err(_) => Err(PoolError::Cancelled),
        },
        None => client.generate_sync(&req.prompt).await.map_err(PoolError::from),
    };
    let latency = start.elapsed();

    let outcome = outcome.map(|mut result| {
        // The pool's measurement includes queueing inside the semaphore
        // holder, which is what callers observe.
        result.latency = latency;
        result
    });

    {
        let mut m = metrics.write().unwrap();
        m.current_inflight -= 1;
        m.total_requests += 1;
        match &outcome {
            Ok(_) => m.completed_ok += 1,
            Err(_) => m.completed_error += 1,
        }
        m.total_latency += latency;
        if m.completed_ok > 0 {
            m.average_latency = m.total_latency / m.completed_ok as u32;
        }
    }

    if req.reply.send(outcome).is_err() {
        tracing::debug!(id = %req.id, "caller went away before the result arrived");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    /// A TCP listener that accepts connections and never responds,
    /// keeping any request against it in flight indefinitely.
    async fn hanging_backend() -> (String, JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match sock.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(_) => {}
                        }
                    }
                });
            }
        });

        (format!("http://{}", addr), handle)
    }

    fn test_config(base_url: &str, workers: usize, queue: usize, concurrent: usize) -> PoolConfig {
        PoolConfig {
            workers,
            queue_size: queue,
            max_concurrent: concurrent,
            client: ClientConfig {
                base_url: base_url.to_string(),
                timeout: Duration::from_secs(60),
                ..ClientConfig::default()
            },
        }
    }

    #[test]
    fn default_config_scales_with_hardware() {
        let config = PoolConfig::default();
        assert!(config.workers >= 2);
        assert_eq!(config.queue_size, 1000);
        assert_eq!(config.max_concurrent, 4);
    }

    #[tokio::test]
    async fn expired_deadline_is_rejected_at_submission() {
        let pool = InferencePool::new(test_config("http://127.0.0.1:1", 1, 4, 1));

        let (tx, _rx) = oneshot::channel();
        let req = PoolRequest::new("hello", 0, tx)
            .with_deadline(Instant::now() - Duration::from_secs(1));

        assert!(matches!(pool.submit(req), Err(PoolError::Cancelled)));
        pool.shutdown(Duration::from_secs(1)).await.ok();
    }

    #[tokio::test]
    async fn full_queue_fails_fast() {
        let (url, server) = hanging_backend().await;
        let pool = InferencePool::new(test_config(&url, 1, 1, 1));

        // First request occupies the single worker...
        let (tx1, _rx1) = oneshot::channel();
        pool.submit(PoolRequest::new("one", 0, tx1)).expect("first submit");
        tokio::time::sleep(Duration::from_millis(100)).await;

        // ...second fills the queue...
        let (tx2, _rx2) = oneshot::channel();
        pool.submit(PoolRequest::new("two", 0, tx2)).expect("second submit");

        // ...third has nowhere to go.
        let (tx3, _rx3) = oneshot::channel();
        let err = pool.submit(PoolRequest::new("three", 0, tx3)).unwrap_err();
        assert!(matches!(err, PoolError::QueueFull));

        // The worker is wedged on the silent backend, so shutdown
        // must hit its timeout and abort stragglers.
        let err = pool.shutdown(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, PoolError::ShutdownTimeout));

        server.abort();
    }

    #[tokio::test]
    async fn inflight_never_exceeds_the_semaphore() {
        let (url, server) = hanging_backend().await;
        let pool = InferencePool::new(test_config(&url, 4, 16, 2));

        let mut receivers = Vec::new();
        for i in 0..4 {
            let (tx, rx) = oneshot::channel();
            pool.submit(PoolRequest::new(format!("req-{i}"), 0, tx))
                .expect("submit");
            receivers.push(rx);
        }

        tokio::time::sleep(Duration::from_millis(200)).await;

        let metrics = pool.metrics();
        assert!(metrics.current_inflight <= 2, "inflight exceeded semaphore");
        assert!(metrics.current_inflight >= 1, "no request in flight");
        assert_eq!(pool.available_permits(), 0);

        pool.shutdown(Duration::from_millis(50)).await.ok();
        server.abort();
    }

    #[tokio::test]
    async fn submit_after_shutdown_reports_closed() {
        let pool = InferencePool::new(test_config("http://127.0.0.1:1", 1, 4, 1));
        pool.shutdown(Duration::from_secs(1)).await.expect("clean shutdown");

        let (tx, _rx) = oneshot::channel();
        let err = pool.submit(PoolRequest::new("late", 0, tx)).unwrap_err();
        assert!(matches!(err, PoolError::Closed));
    }

    #[tokio::test]
    async fn failed_requests_show_up_in_metrics() {
        // Nothing listens on port 1, so the request fails immediately.
        let pool = InferencePool::new(test_config("http://127.0.0.1:1", 1, 4, 1));

        let err = pool.submit_sync("hello", 0).await.unwrap_err();
        assert!(matches!(err, PoolError::Inference(_)));

        let metrics = pool.metrics();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.completed_error, 1);
        assert_eq!(metrics.completed_ok, 0);
        // Mean latency is the zero duration until something succeeds.
        assert_eq!(metrics.average_latency, Duration::ZERO);
        assert_eq!(metrics.current_inflight, 0);

        pool.shutdown(Duration::from_secs(1)).await.ok();
    }
}
