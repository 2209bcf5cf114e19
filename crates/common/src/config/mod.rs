//! Configuration management for Citator services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Queue configuration (SQS)
    #[serde(default)]
    pub queue: QueueConfig,

    /// Corpus index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Extraction and resolution tuning
    #[serde(default)]
    pub citations: CitationsConfig,

    /// Link markup for annotated opinions
    #[serde(default)]
    pub annotation: AnnotationConfig,

    /// Batch driver configuration
    #[serde(default)]
    pub batch: BatchConfig,

    /// Queue worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Queue the citation worker consumes
    pub citation_queue_url: Option<String>,

    /// Named task queues selectable from the batch CLI (name -> URL)
    #[serde(default)]
    pub queue_urls: HashMap<String, String>,

    /// Dead letter queue URL
    pub dlq_url: Option<String>,

    /// AWS region override
    pub region: Option<String>,

    /// Maximum messages to receive per poll
    #[serde(default = "default_queue_batch_size")]
    pub batch_size: i32,

    /// Long polling timeout in seconds
    #[serde(default = "default_queue_poll_timeout")]
    pub poll_timeout_secs: i32,

    /// Visibility timeout in seconds
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Backend: "search" (HTTP search index) or "memory" (loaded from the database)
    #[serde(default = "default_index_backend")]
    pub backend: String,

    /// Search index base URL
    #[serde(default = "default_index_url")]
    pub base_url: String,

    /// Index holding opinion documents
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,

    /// Query rate limit
    #[serde(default = "default_index_rps")]
    pub requests_per_second: u32,

    /// Burst capacity for the rate limiter
    #[serde(default = "default_index_burst")]
    pub burst: u32,

    /// Maximum retries for transient failures
    #[serde(default = "default_index_retries")]
    pub max_retries: u32,

    /// Upper bound on total retry time in seconds
    #[serde(default = "default_index_retry_elapsed")]
    pub max_retry_elapsed_secs: u64,

    /// How far below a cited page a document may start and still match
    #[serde(default = "default_nearby_page_window")]
    pub nearby_page_window: u32,

    /// Maximum hits requested per query
    #[serde(default = "default_index_max_hits")]
    pub max_hits: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CitationsConfig {
    /// Tokens scanned forward from the page for a parenthetical
    #[serde(default = "default_forward_seek")]
    pub forward_seek: usize,

    /// Tokens scanned backward from the volume for party names
    #[serde(default = "default_backward_seek")]
    pub backward_seek: usize,

    /// Tokens that end the backward party scan
    #[serde(default = "default_stop_tokens")]
    pub stop_tokens: Vec<String>,

    /// Earliest plausible decision year
    #[serde(default = "default_min_year")]
    pub min_year: i32,

    /// Token distance that groups citations as parallel
    #[serde(default = "default_parallel_distance")]
    pub parallel_distance: usize,

    /// Minimum edge weight before a parallel citation is promoted
    #[serde(default = "default_edge_relevance_threshold")]
    pub edge_relevance_threshold: u32,

    /// Reporter spellings ignored by the parallel graph
    #[serde(default = "default_graph_reporter_blacklist")]
    pub graph_reporter_blacklist: Vec<String>,

    /// Volumes at or above this value are rejected before storage
    #[serde(default = "default_volume_ceiling")]
    pub volume_ceiling: u32,

    /// Court assigned to early high-court reporters without a parenthetical
    #[serde(default = "default_high_court_id")]
    pub high_court_id: String,

    /// Precedential status required of resolution targets
    #[serde(default = "default_precedential_status")]
    pub precedential_status: String,

    /// Reporter reference data in the reporters-db JSON layout.
    ///
    /// When unset the bundled table is used. It covers only the common
    /// federal, regional and early high-court reporters, so citations to
    /// anything else are not recognized. Production deployments should
    /// point this at a full reporters database export.
    pub reporters_path: Option<String>,

    /// Court registry (JSON array of courts with citation strings).
    ///
    /// The bundled registry is a small subset, like the bundled reporters;
    /// set this alongside `reporters_path` in production.
    pub courts_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnnotationConfig {
    /// Path prefix for links to resolved opinions
    #[serde(default = "default_link_base")]
    pub link_base: String,

    /// Fragment prefix for pin-cite anchors ("p" gives "#p241")
    #[serde(default = "default_anchor_prefix")]
    pub anchor_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Queue used when --queue is not given
    #[serde(default = "default_batch_queue")]
    pub default_queue: String,

    /// Backlog the throttle tries to keep on the queue
    #[serde(default = "default_throttle_min_items")]
    pub throttle_min_items: u64,

    /// Opinions per dispatched job
    #[serde(default = "default_opinions_per_task")]
    pub opinions_per_task: usize,

    /// Seconds between backlog reads
    #[serde(default = "default_throttle_poll")]
    pub throttle_poll_secs: u64,

    /// Longest single pause while the backlog drains
    #[serde(default = "default_throttle_max_wait")]
    pub throttle_max_wait_secs: u64,

    /// Rows fetched per database page
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Log progress every N opinions
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    /// Pause while the circuit is open, in seconds
    #[serde(default = "default_circuit_break")]
    pub circuit_break_secs: u64,

    /// Retries for a single opinion on transient errors
    #[serde(default = "default_worker_retries")]
    pub max_retries: u32,

    /// Upper bound on total retry time per opinion, in seconds
    #[serde(default = "default_worker_retry_elapsed")]
    pub retry_max_elapsed_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_database_url() -> String { "postgres://localhost/citator".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_queue_batch_size() -> i32 { 10 }
fn default_queue_poll_timeout() -> i32 { 20 }
fn default_visibility_timeout() -> i32 { 900 }
fn default_index_backend() -> String { "search".to_string() }
fn default_index_url() -> String { "http://localhost:9200".to_string() }
fn default_index_name() -> String { "opinions".to_string() }
fn default_index_timeout() -> u64 { 30 }
fn default_index_rps() -> u32 { 50 }
fn default_index_burst() -> u32 { 100 }
fn default_index_retries() -> u32 { 3 }
fn default_index_retry_elapsed() -> u64 { 60 }
fn default_nearby_page_window() -> u32 { 100 }
fn default_index_max_hits() -> usize { 5 }
fn default_forward_seek() -> usize { 20 }
fn default_backward_seek() -> usize { 28 }
fn default_min_year() -> i32 { 1754 }
fn default_parallel_distance() -> usize { 4 }
fn default_edge_relevance_threshold() -> u32 { 20 }
fn default_volume_ceiling() -> u32 { 32767 }
fn default_high_court_id() -> String { "scotus".to_string() }
fn default_precedential_status() -> String { "Published".to_string() }
fn default_link_base() -> String { "/opinion".to_string() }
fn default_anchor_prefix() -> String { "p".to_string() }
fn default_batch_queue() -> String { "batch1".to_string() }
fn default_throttle_min_items() -> u64 { 50 }
fn default_opinions_per_task() -> usize { 50 }
fn default_throttle_poll() -> u64 { 5 }
fn default_throttle_max_wait() -> u64 { 120 }
fn default_page_size() -> u64 { 1000 }
fn default_progress_every() -> u64 { 1000 }
fn default_max_failures() -> u32 { 5 }
fn default_circuit_break() -> u64 { 30 }
fn default_worker_retries() -> u32 { 3 }
fn default_worker_retry_elapsed() -> u64 { 120 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "citator".to_string() }

fn default_stop_tokens() -> Vec<String> {
    [
        "v", "re", "parte", "denied", "citing", "aff'd", "affirmed", "remanded", "see",
        "granted", "dismissed",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_graph_reporter_blacklist() -> Vec<String> {
    vec!["Id.".to_string(), "Cr.".to_string()]
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__CITATIONS__FORWARD_SEEK=25
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Resolve a named task queue to its URL
    pub fn queue_url(&self, name: &str) -> Option<&str> {
        self.queue.queue_urls.get(name).map(String::as_str)
    }
}

impl IndexConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            citation_queue_url: None,
            queue_urls: HashMap::new(),
            dlq_url: None,
            region: None,
            batch_size: default_queue_batch_size(),
            poll_timeout_secs: default_queue_poll_timeout(),
            visibility_timeout_secs: default_visibility_timeout(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            base_url: default_index_url(),
            index_name: default_index_name(),
            timeout_secs: default_index_timeout(),
            requests_per_second: default_index_rps(),
            burst: default_index_burst(),
            max_retries: default_index_retries(),
            max_retry_elapsed_secs: default_index_retry_elapsed(),
            nearby_page_window: default_nearby_page_window(),
            max_hits: default_index_max_hits(),
        }
    }
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            forward_seek: default_forward_seek(),
            backward_seek: default_backward_seek(),
            stop_tokens: default_stop_tokens(),
            min_year: default_min_year(),
            parallel_distance: default_parallel_distance(),
            edge_relevance_threshold: default_edge_relevance_threshold(),
            graph_reporter_blacklist: default_graph_reporter_blacklist(),
            volume_ceiling: default_volume_ceiling(),
            high_court_id: default_high_court_id(),
            precedential_status: default_precedential_status(),
            reporters_path: None,
            courts_path: None,
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            link_base: default_link_base(),
            anchor_prefix: default_anchor_prefix(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_queue: default_batch_queue(),
            throttle_min_items: default_throttle_min_items(),
            opinions_per_task: default_opinions_per_task(),
            throttle_poll_secs: default_throttle_poll(),
            throttle_max_wait_secs: default_throttle_max_wait(),
            page_size: default_page_size(),
            progress_every: default_progress_every(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_failures(),
            circuit_break_secs: default_circuit_break(),
            max_retries: default_worker_retries(),
            retry_max_elapsed_secs: default_worker_retry_elapsed(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}
