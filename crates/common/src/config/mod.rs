//! Configuration management for ThesisForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Language model provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Paper search service configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Document renderer configuration
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Pipeline tuning
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds. Generation requests wait on the
    /// language model, so this is much longer than a CRUD timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
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

    /// Apply the embedded schema at startup
    #[serde(default = "default_enabled")]
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key for the chat completions endpoint
    pub api_key: Option<String>,

    /// API base URL (OpenAI compatible)
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on output tokens for any single completion
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Paper search API base URL
    #[serde(default = "default_search_api_base")]
    pub api_base: String,

    /// Optional API key, sent as `x-api-key`
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Hard upper bound on a result page
    #[serde(default = "default_search_max_results")]
    pub max_results: u32,

    /// Page size used when the caller's limit is out of range
    #[serde(default = "default_search_limit")]
    pub default_limit: u32,

    /// Minimum year defaults to this many years before the current one
    #[serde(default = "default_year_window")]
    pub default_year_window: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RendererConfig {
    /// Renderer service base URL
    #[serde(default = "default_renderer_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_renderer_timeout")]
    pub timeout_secs: u64,

    /// Directory the renderer writes artifacts into
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Author name printed on the title page
    #[serde(default = "default_student_name")]
    pub student_name: String,

    /// Institution printed on the title page
    #[serde(default = "default_university_name")]
    pub university_name: String,

    #[serde(default = "default_font_family")]
    pub font_family: String,

    #[serde(default = "default_font_size")]
    pub font_size_main: u32,

    #[serde(default = "default_line_spacing")]
    pub line_spacing: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Target words per themed section
    #[serde(default = "default_section_word_count")]
    pub section_word_count: u32,

    /// Character budget for the literature review summary fed to the introduction
    #[serde(default = "default_intro_context_chars")]
    pub intro_context_chars: usize,

    /// Upper bound on themes accepted from clustering
    #[serde(default = "default_max_themes")]
    pub max_themes: usize,

    /// Concurrent section synthesis calls within one review
    #[serde(default = "default_synthesis_concurrency")]
    pub synthesis_concurrency: usize,

    /// Age after which a `processing` document is considered abandoned
    #[serde(default = "default_stale_document_secs")]
    pub stale_document_secs: u64,

    /// Interval between stale document sweeps (0 disables the sweep)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Total time spent retrying the final document status write
    #[serde(default = "default_status_retry_secs")]
    pub status_retry_secs: u64,
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
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 600 }

/// Headroom over the LLM calls for paper lookups and database writes
const GENERATION_TIMEOUT_MARGIN_SECS: u64 = 120;
fn default_shutdown_timeout() -> u64 { 30 }
fn default_database_url() -> String { "postgres://localhost/thesisforge".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_enabled() -> bool { true }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model() -> String { "gpt-4".to_string() }
fn default_llm_timeout() -> u64 { 120 }
fn default_llm_max_tokens() -> u32 { 4096 }
fn default_search_api_base() -> String { "https://api.semanticscholar.org".to_string() }
fn default_search_timeout() -> u64 { 30 }
fn default_search_max_results() -> u32 { 50 }
fn default_search_limit() -> u32 { 25 }
fn default_year_window() -> i32 { 5 }
fn default_renderer_url() -> String { "http://localhost:8001".to_string() }
fn default_renderer_timeout() -> u64 { 300 }
fn default_output_dir() -> String { "generated_documents".to_string() }
fn default_student_name() -> String { "Student Name".to_string() }
fn default_university_name() -> String { "University Name".to_string() }
fn default_font_family() -> String { "Times New Roman".to_string() }
fn default_font_size() -> u32 { 12 }
fn default_line_spacing() -> f32 { 1.5 }
fn default_section_word_count() -> u32 { 500 }
fn default_intro_context_chars() -> usize { 1000 }
fn default_max_themes() -> usize { 5 }
fn default_synthesis_concurrency() -> usize { 1 }
fn default_stale_document_secs() -> u64 { 900 }
fn default_sweep_interval_secs() -> u64 { 300 }
fn default_status_retry_secs() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "thesisforge".to_string() }

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
            // e.g., APP__LLM__API_KEY=sk-...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Request timeout for chapter generation.
    ///
    /// One clustering call plus one synthesis round per `synthesis_concurrency`
    /// themes, each bounded by the LLM timeout, plus a margin for retrieval and
    /// persistence. Never shorter than the general request timeout.
    pub fn generation_timeout(&self) -> Duration {
        let concurrency = self.generation.synthesis_concurrency.max(1);
        let rounds = self.generation.max_themes.div_ceil(concurrency) as u64 + 1;
        let secs = self
            .llm
            .timeout_secs
            .saturating_mul(rounds)
            .saturating_add(GENERATION_TIMEOUT_MARGIN_SECS);
        Duration::from_secs(secs).max(self.request_timeout())
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl GenerationConfig {
    pub fn stale_document_age(&self) -> Duration {
        Duration::from_secs(self.stale_document_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            renderer: RendererConfig::default(),
            generation: GenerationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
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
            auto_migrate: default_enabled(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_base: default_llm_api_base(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_base: default_search_api_base(),
            api_key: None,
            timeout_secs: default_search_timeout(),
            max_results: default_search_max_results(),
            default_limit: default_search_limit(),
            default_year_window: default_year_window(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: default_renderer_url(),
            timeout_secs: default_renderer_timeout(),
            output_dir: default_output_dir(),
            student_name: default_student_name(),
            university_name: default_university_name(),
            font_family: default_font_family(),
            font_size_main: default_font_size(),
            line_spacing: default_line_spacing(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            section_word_count: default_section_word_count(),
            intro_context_chars: default_intro_context_chars(),
            max_themes: default_max_themes(),
            synthesis_concurrency: default_synthesis_concurrency(),
            stale_document_secs: default_stale_document_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            status_retry_secs: default_status_retry_secs(),
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
