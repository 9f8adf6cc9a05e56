//! Configuration loading from `~/.quantumflow/config.toml`.
//!
//! Every section is optional and every field overrides a default, so an
//! absent file (the common case) yields a fully working configuration.
//!
//! ```toml
//! [client]
//! base_url = "http://localhost:11434"
//! model = "qwen2.5-coder:7b"
//! context_size = 32768
//! temperature = 0.7
//! timeout_secs = 900
//!
//! [pool]
//! workers = 8
//! queue_size = 1000
//! max_concurrent = 4
//!
//! [orchestrator]
//! classifier = "rule-based"   # or "llm"
//! parallel_execution = false
//! conflict_resolution = true
//! default_timeout_secs = 300
//! ```

use crate::inference::PoolConfig;
use crate::orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML file at {path}: {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which classifier the orchestrator is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierChoice {
    #[default]
    RuleBased,
    Llm,
}

/// Unified application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub orchestrator: OrchestratorConfig,
    pub classifier: ClassifierChoice,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    client: RawClient,
    pool: RawPool,
    orchestrator: RawOrchestrator,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawClient {
    base_url: Option<String>,
    model: Option<String>,
    context_size: Option<u32>,
    temperature: Option<f64>,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawPool {
    workers: Option<usize>,
    queue_size: Option<usize>,
    max_concurrent: Option<usize>,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawOrchestrator {
    classifier: Option<String>,
    parallel_execution: Option<bool>,
    conflict_resolution: Option<bool>,
    default_timeout_secs: Option<u64>,
}

/// Load configuration from `<root>/.quantumflow/config.toml`.
///
/// A missing file yields [`AppConfig::default`]; a present but broken
/// file is an error rather than a silent fallback.
pub fn load_config(root: &Path) -> Result<AppConfig, ConfigError> {
    let path = root.join(".quantumflow").join("config.toml");
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::FileRead {
        path: path.clone(),
        source,
    })?;

    let raw: RawConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse { path, source })?;

    let mut config = AppConfig::default();

    if let Some(base_url) = raw.client.base_url {
        config.pool.client.base_url = base_url;
    }
    if let Some(model) = raw.client.model {
        config.pool.client.model = model;
    }
    if let Some(context_size) = raw.client.context_size {
        config.pool.client.context_size = context_size;
    }
    if let Some(temperature) = raw.client.temperature {
        config.pool.client.temperature = temperature;
    }
    if let Some(secs) = raw.client.timeout_secs {
        config.pool.client.timeout = Duration::from_secs(secs);
    }

    if let Some(workers) = raw.pool.workers {
        config.pool.workers = workers;
    }
    if let Some(queue_size) = raw.pool.queue_size {
        config.pool.queue_size = queue_size;
    }
    if let Some(max_concurrent) = raw.pool.max_concurrent {
        config.pool.max_concurrent = max_concurrent;
    }

    if let Some(label) = raw.orchestrator.classifier {
        config.classifier = match label.as_str() {
            "rule-based" => ClassifierChoice::RuleBased,
            "llm" => ClassifierChoice::Llm,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown classifier {other:?}, expected \"rule-based\" or \"llm\""
                )))
            }
        };
    }
    if let Some(parallel) = raw.orchestrator.parallel_execution {
        config.orchestrator.parallel_execution = parallel;
    }
    if let Some(conflict) = raw.orchestrator.conflict_resolution {
        config.orchestrator.conflict_resolution = conflict;
    }
    if let Some(secs) = raw.orchestrator.default_timeout_secs {
        config.orchestrator.default_timeout = Duration::from_secs(secs);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.pool.workers == 0 {
        return Err(ConfigError::Invalid("pool.workers must be positive".into()));
    }
    if config.pool.queue_size == 0 {
        return Err(ConfigError::Invalid(
            "pool.queue_size must be positive".into(),
        ));
    }
    if config.pool.max_concurrent == 0 {
        return Err(ConfigError::Invalid(
            "pool.max_concurrent must be positive".into(),
        ));
    }
    if !(0.0..=2.0).contains(&config.pool.client.temperature) {
        return Err(ConfigError::Invalid(
            "client.temperature must be within [0, 2]".into(),
        ));
    }
    Ok(())
}
