//! Configuration for the backend service.

use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure for the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Gateway-side upload validation.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Extensions accepted by the gateway, lower-case, without the dot.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Per-file size cap in bytes. 0 disables the cap.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    /// Whole-request body cap in bytes.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_image_bytes: default_max_image_bytes(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

/// Broker channel tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum queued (not yet consumed) envelopes.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Unacked deliveries are requeued after this many seconds. Must exceed
    /// the worker task timeout or tasks get redelivered while still running.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
    /// A task delivered more than this many times is dead-lettered.
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            visibility_timeout_secs: default_visibility_timeout(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

/// Worker pool tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// Detection that runs longer than this fails with a timeout.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            task_timeout_secs: default_task_timeout(),
        }
    }
}

/// Detection backend endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Base URL of the model server.
    #[serde(default = "default_detector_endpoint")]
    pub endpoint: String,
    /// Confidence threshold forwarded to the model server.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl DetectorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_detector_endpoint(),
            confidence: default_confidence(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_allowed_extensions() -> Vec<String> {
    vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()]
}
fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_request_bytes() -> usize {
    64 * 1024 * 1024
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_visibility_timeout() -> u64 {
    120
}
fn default_max_deliveries() -> u32 {
    3
}
fn default_worker_count() -> usize {
    4
}
fn default_task_timeout() -> u64 {
    60
}
fn default_detector_endpoint() -> String {
    "http://localhost:8600".to_string()
}
fn default_confidence() -> f32 {
    0.3
}
fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (VISIONQ__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("VISIONQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
