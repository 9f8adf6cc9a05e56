//! HTTP client for a local Ollama-compatible backend.
//!
//! The backend speaks newline-delimited JSON on its streaming endpoints;
//! each record carries a token fragment and a `done` flag. Synchronous
//! generation returns a single JSON object with evaluation counters that
//! we turn into throughput numbers.

use crate::inference::error::ClientError;
use qf_protocol::Message;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

/// Depth of the token channel handed to streaming consumers. The backend
/// decides cadence; the buffer decouples the producer from a slow UI.
const STREAM_BUFFER: usize = 100;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Context window size (`options.num_ctx`).
    pub context_size: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Outer HTTP timeout. Generous, local models are slow.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            context_size: 32_768,
            temperature: 0.7,
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Aggregate result of one synchronous generation.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub response: String,
    pub tokens_per_sec: f64,
    pub latency: Duration,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<&'a [Message]>,
    stream: bool,
    temperature: f64,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_ctx: u32,
}

/// One record of the `/api/generate` stream (and the whole body when
/// `stream: false`).
#[derive(Deserialize, Debug, Default)]
struct GenerateRecord {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: i64,
    #[serde(default)]
    eval_duration: i64,
}

/// One record of the `/api/chat` stream.
#[derive(Deserialize, Debug, Default)]
struct ChatRecord {
    #[serde(default)]
    message: ChatMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize, Debug, Default)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsBody {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Output tokens per second from the backend's evaluation counters.
/// Zero unless both counters are positive.
fn tokens_per_sec(eval_count: i64, eval_duration_nanos: i64) -> f64 {
    if eval_count > 0 && eval_duration_nanos > 0 {
        eval_count as f64 / (eval_duration_nanos as f64 / 1e9)
    } else {
        0.0
    }
}

/// Single-address client for the backend LLM.
pub struct OllamaClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// List model names the backend has available.
    pub async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/api/tags", self.config.base_url);
        let resp = self.http.get(&url).send().await?;
        let resp = Self::check_status(resp).await?;

        let body: TagsBody = resp.json().await?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }

    /// Generate a completion for `prompt`.
    ///
    /// Returns a channel of token fragments delivered in arrival order.
    /// The sequence is finite and non-restartable; dropping the receiver
    /// stops the producer promptly. With `streaming` false the backend
    /// replies with one record and the channel yields a single item.
    pub async fn generate(
        &self,
        prompt: &str,
        streaming: bool,
    ) -> Result<mpsc::Receiver<String>, ClientError> {
        let body = GenerateBody {
            model: &self.config.model,
            prompt: Some(prompt),
            messages: None,
            stream: streaming,
            temperature: self.config.temperature,
            options: GenerateOptions {
                num_ctx: self.config.context_size,
            },
        };

        let url = format!("{}/api/generate", self.config.base_url);
        let resp = self.http.post(&url).json(&body).send().await?;
        let resp = Self::check_status(resp).await?;

        Ok(spawn_line_reader(resp, |line| {
            let record: GenerateRecord = serde_json::from_slice(line).ok()?;
            Some((record.response, record.done))
        }))
    }

    /// Generate through the chat endpoint with message history.
    pub async fn generate_chat(
        &self,
        messages: &[Message],
        streaming: bool,
    ) -> Result<mpsc::Receiver<String>, ClientError> {
        let body = GenerateBody {
            model: &self.config.model,
            prompt: None,
            messages: Some(messages),
            stream: streaming,
            temperature: self.config.temperature,
            options: GenerateOptions {
                num_ctx: self.config.context_size,
            },
        };

        let url = format!("{}/api/chat", self.config.base_url);
        let resp = self.http.post(&url).json(&body).send().await?;
        let resp = Self::check_status(resp).await?;

        Ok(spawn_line_reader(resp, |line| {
            let record: ChatRecord = serde_json::from_slice(line).ok()?;
            Some((record.message.content, record.done))
        }))
    }

    /// Synchronous (non-streaming) generation with aggregate statistics.
    pub async fn generate_sync(&self, prompt: &str) -> Result<InferenceResult, ClientError> {
        let start = Instant::now();

        let body = GenerateBody {
            model: &self.config.model,
            prompt: Some(prompt),
            messages: None,
            stream: false,
            temperature: self.config.temperature,
            options: GenerateOptions {
                num_ctx: self.config.context_size,
            },
        };

        let url = format!("{}/api/generate", self.config.base_url);
        let resp = self.http.post(&url).json(&body).send().await?;
        let resp = Self::check_status(resp).await?;

        let raw = resp.bytes().await?;
        let record: GenerateRecord =
            serde_json::from_slice(&raw).map_err(ClientError::Decode)?;

        Ok(InferenceResult {
            response: record.response,
            tokens_per_sec: tokens_per_sec(record.eval_count, record.eval_duration),
            latency: start.elapsed(),
        })
    }

    /// Pull a model from the backend registry, draining the progress
    /// stream. Progress records are not interpreted.
    pub async fn pull_model(&self, name: &str) -> Result<(), ClientError> {
        let url = format!("{}/api/pull", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            chunk?;
        }
        Ok(())
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(ClientError::UnexpectedStatus { status, body })
        }
    }
}

/// Read a newline-delimited JSON body in a background task, feeding parsed
/// fragments into a bounded channel.
///
/// `parse` maps one line to `(fragment, done)`; lines that fail to parse
/// are skipped. The task ends at `done`, at body end, or when the receiver
/// is dropped.
fn spawn_line_reader<F>(resp: reqwest::Response, parse: F) -> mpsc::Receiver<String>
where
    F: Fn(&[u8]) -> Option<(String, bool)> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(err) => {
                    tracing::debug!(error = %err, "token stream aborted");
                    return;
                }
            };
            buf.extend_from_slice(&chunk);

            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                if !deliver(&tx, &parse, &line[..line.len() - 1]).await {
                    return;
                }
            }
        }

        // A non-streaming body may be a single record without a trailing
        // newline.
        if !buf.is_empty() {
            deliver(&tx, &parse, &buf).await;
        }
    });

    rx
}

/// Returns false when the stream should stop (done record or receiver gone).
async fn deliver<F>(tx: &mpsc::Sender<String>, parse: &F, line: &[u8]) -> bool
where
    F: Fn(&[u8]) -> Option<(String, bool)>,
{
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return true;
    }
    let Some((fragment, done)) = parse(line) else {
        // Malformed record; keep reading.
        return true;
    };
    if !fragment.is_empty() && tx.send(fragment).await.is_err() {
        return false;
    }
    !done
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "qwen2.5-coder:7b");
        assert_eq!(config.context_size, 32_768);
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn tokens_per_sec_requires_positive_counters() {
        assert_eq!(tokens_per_sec(0, 1_000_000), 0.0);
        assert_eq!(tokens_per_sec(100, 0), 0.0);
        assert_eq!(tokens_per_sec(-5, 1_000_000), 0.0);

        // 100 tokens over half a second.
        let tps = tokens_per_sec(100, 500_000_000);
        assert!((tps - 200.0).abs() < 1e-9);
    }

    #[test]
    fn generate_record_tolerates_missing_fields() {
        let record: GenerateRecord = serde_json::from_str(r#"{"response":"hi"}"#).unwrap();
        assert_eq!(record.response, "hi");
        assert!(!record.done);

        let done: GenerateRecord = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(done.done);
        assert!(done.response.is_empty());
    }

    #[test]
    fn chat_record_extracts_message_content() {
        let record: ChatRecord =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":"tok"},"done":false}"#)
                .unwrap();
        assert_eq!(record.message.content, "tok");
        assert!(!record.done);
    }

    #[tokio::test]
    async fn connection_failure_is_a_connection_error() {
        let client = OllamaClient::new(ClientConfig {
            // Reserved port, nothing listens here.
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        });

        let err = client.generate_sync("hello").await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }
}
