use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Identity reported by `initialize`
    #[serde(default)]
    pub identity: IdentityConfig,

    /// State backend configuration
    pub state: StateConfig,

    /// Corpus staging area
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Sync pipeline configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Integration configurations
    #[serde(default)]
    pub integrations: IntegrationsConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: INCIDENT_KB_)
            .add_source(
                config::Environment::with_prefix("INCIDENT_KB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Embedded defaults only, ignoring files and environment
    pub fn defaults() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_server_name")]
    pub name: String,

    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for embedded database
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Root directory of the staging object store
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,

    /// Key prefix for synchronized documents
    #[serde(default = "default_corpus_prefix")]
    pub key_prefix: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
            key_prefix: default_corpus_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run the pipeline on a schedule
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (seconds field included)
    #[serde(default = "default_sync_schedule")]
    pub schedule: String,

    /// Maximum records fetched per pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts after which a record is skipped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Namespace for pass-level metrics
    #[serde(default = "default_metrics_namespace")]
    pub metrics_namespace: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            schedule: default_sync_schedule(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            metrics_namespace: default_metrics_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntegrationsConfig {
    /// Semantic retrieval over the corpus
    pub retrieval: Option<IntegrationConfig>,
    /// Generative analysis and query optimisation
    pub analysis: Option<IntegrationConfig>,
    /// Corpus ingestion job trigger
    pub ingestion: Option<IntegrationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub auth_token_env: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl IntegrationConfig {
    /// Resolve the bearer token from the configured environment variable
    pub fn auth_token(&self) -> Option<String> {
        self.auth_token_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_server_name() -> String {
    "incident-kb-mcp".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("./data/corpus")
}

fn default_corpus_prefix() -> String {
    "incidents/closed/".to_string()
}

fn default_sync_schedule() -> String {
    "0 0 * * * *".to_string() // hourly
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_metrics_namespace() -> String {
    "IncidentManagement/KBSync".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "incident-kb-mcp".to_string()
}

fn default_true() -> bool {
    true
}
