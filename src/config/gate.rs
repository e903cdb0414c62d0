//! Gate configuration structures.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ExecutionNaming;

/// Semaphore store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    InMemory,
    /// SQLite-backed store; every table lives in one database under `directory`.
    Sqlite {
        /// Directory holding the database file.
        directory: PathBuf,
    },
}

fn default_batch_size() -> usize {
    10
}

const fn default_store_timeout_ms() -> u64 {
    2_000
}

const fn default_release_max_attempts() -> u32 {
    5
}

const fn default_release_backoff_ms() -> u64 {
    100
}

fn default_consumer_count() -> usize {
    num_cpus::get()
}

/// Process-wide configuration. Static for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Store backend.
    pub store: StoreBackendConfig,
    /// Table holding the semaphore records.
    pub table_name: String,
    /// Workflow engine target (e.g. a state machine identifier).
    pub workflow_target: String,
    /// Queue the consumers read from.
    pub queue_name: String,
    /// Maximum messages per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Request timeout applied to acquire and release.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Execution naming strategy.
    #[serde(default)]
    pub execution_naming: ExecutionNaming,
    /// Receives after which a message is dead-lettered; unbounded when absent.
    #[serde(default)]
    pub max_receive_count: Option<u32>,
    /// Attempts per release event.
    #[serde(default = "default_release_max_attempts")]
    pub release_max_attempts: u32,
    /// Base backoff between release attempts.
    #[serde(default = "default_release_backoff_ms")]
    pub release_backoff_ms: u64,
    /// Consumer instances to run in this process.
    #[serde(default = "default_consumer_count")]
    pub consumer_count: usize,
}

impl GateConfig {
    /// Configuration with defaults for everything but the three identifiers.
    pub fn new(
        table_name: impl Into<String>,
        workflow_target: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            store: StoreBackendConfig::InMemory,
            table_name: table_name.into(),
            workflow_target: workflow_target.into(),
            queue_name: queue_name.into(),
            batch_size: default_batch_size(),
            store_timeout_ms: default_store_timeout_ms(),
            execution_naming: ExecutionNaming::default(),
            max_receive_count: None,
            release_max_attempts: default_release_max_attempts(),
            release_backoff_ms: default_release_backoff_ms(),
            consumer_count: default_consumer_count(),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.table_name.trim().is_empty() {
            return Err("table_name must not be empty".into());
        }
        if self.workflow_target.trim().is_empty() {
            return Err("workflow_target must not be empty".into());
        }
        if self.queue_name.trim().is_empty() {
            return Err("queue_name must not be empty".into());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".into());
        }
        if self.store_timeout_ms == 0 {
            return Err("store_timeout_ms must be greater than 0".into());
        }
        if self.release_max_attempts == 0 {
            return Err("release_max_attempts must be greater than 0".into());
        }
        if self.consumer_count == 0 {
            return Err("consumer_count must be greater than 0".into());
        }
        if self.max_receive_count == Some(0) {
            return Err("max_receive_count must be greater than 0 when set".into());
        }
        if let StoreBackendConfig::Sqlite { directory } = &self.store {
            if directory.as_os_str().is_empty() {
                return Err("sqlite store directory must not be empty".into());
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from the environment, loading `.env` first if present.
    ///
    /// Required: `TABLE_NAME`, `STATE_MACHINE_ARN`, `QUEUE_NAME`. Optional:
    /// `STORE_DIR` (selects the SQLite store), `BATCH_SIZE`, `STORE_TIMEOUT_MS`,
    /// `EXECUTION_NAMING` (`random` or `deterministic`), `MAX_RECEIVE_COUNT`.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| format!("{key} is not set"));
        let mut cfg = Self::new(
            required("TABLE_NAME")?,
            required("STATE_MACHINE_ARN")?,
            required("QUEUE_NAME")?,
        );
        if let Some(dir) = lookup("STORE_DIR") {
            cfg.store = StoreBackendConfig::Sqlite {
                directory: PathBuf::from(dir),
            };
        }
        if let Some(v) = lookup("BATCH_SIZE") {
            cfg.batch_size = v.parse().map_err(|e| format!("BATCH_SIZE: {e}"))?;
        }
        if let Some(v) = lookup("STORE_TIMEOUT_MS") {
            cfg.store_timeout_ms = v.parse().map_err(|e| format!("STORE_TIMEOUT_MS: {e}"))?;
        }
        if let Some(v) = lookup("MAX_RECEIVE_COUNT") {
            cfg.max_receive_count = Some(v.parse().map_err(|e| format!("MAX_RECEIVE_COUNT: {e}"))?);
        }
        if let Some(v) = lookup("EXECUTION_NAMING") {
            cfg.execution_naming = match v.as_str() {
                "random" => ExecutionNaming::Random,
                "deterministic" => ExecutionNaming::Deterministic,
                other => return Err(format!("EXECUTION_NAMING: unknown strategy `{other}`")),
            };
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Store request timeout.
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Base backoff between release attempts.
    pub const fn release_backoff(&self) -> Duration {
        Duration::from_millis(self.release_backoff_ms)
    }
}
