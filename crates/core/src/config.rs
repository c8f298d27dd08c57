//! Configuration for decomplens with per-project overrides.
//!
//! Config priority: project-relative (.decomplens/config.toml) > user (~/.config/decomplens/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "DECOMPLENS_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

// ============================================================================
// Service Configuration
// ============================================================================

/// Body/response shape spoken to the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
  #[default]
  Simple,
  #[serde(rename = "openai")]
  OpenAi,
  Anthropic,
  Mistral,
}

impl WireFormat {
  /// Model used when `[service] model` is unset
  pub fn default_model(&self) -> Option<&'static str> {
    match self {
      WireFormat::Simple => None,
      WireFormat::OpenAi => Some("gpt-4o-mini"),
      WireFormat::Anthropic => Some("claude-3-5-haiku-latest"),
      WireFormat::Mistral => Some("mistral-small-latest"),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      WireFormat::Simple => "simple",
      WireFormat::OpenAi => "openai",
      WireFormat::Anthropic => "anthropic",
      WireFormat::Mistral => "mistral",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
  #[default]
  Post,
  Put,
}

/// How the credential is attached to each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
  /// `Authorization: Bearer <key>`
  Bearer,
  /// Raw key in the header named by `auth_header`
  Header,
  None,
}

/// Remote service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  /// Endpoint URL that receives one request per outbound call
  pub endpoint: String,

  /// HTTP method (POST or PUT)
  pub method: HttpMethod,

  /// Body/response shape: simple, openai, anthropic, mistral
  pub wire_format: WireFormat,

  /// Authentication scheme. When unset it is derived from the wire format:
  /// anthropic uses the x-api-key header, others use bearer when a key exists.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auth: Option<AuthScheme>,

  /// Header name for `auth = "header"`
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auth_header: Option<String>,

  /// API key. If not set, reads from DECOMPLENS_API_KEY env var
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,

  /// Model name for chat-style wire formats
  #[serde(skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,

  /// Completion token limit for chat-style wire formats
  pub max_tokens: u32,

  /// Sampling temperature for chat-style wire formats
  pub temperature: f32,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      endpoint: "http://localhost:8080/v1/explain".to_string(),
      method: HttpMethod::Post,
      wire_format: WireFormat::Simple,
      auth: None,
      auth_header: None,
      api_key: None,
      model: None,
      max_tokens: 4096,
      temperature: 0.7,
    }
  }
}

impl ServiceConfig {
  /// Effective auth scheme after wire-format defaults
  pub fn auth_scheme(&self, has_key: bool) -> AuthScheme {
    match self.auth {
      Some(scheme) => scheme,
      None if self.wire_format == WireFormat::Anthropic => AuthScheme::Header,
      None if has_key => AuthScheme::Bearer,
      None => AuthScheme::None,
    }
  }

  /// Header used by `AuthScheme::Header`
  pub fn auth_header_name(&self) -> &str {
    self.auth_header.as_deref().unwrap_or("x-api-key")
  }

  /// Whether the endpoint is served from this machine
  pub fn is_local(&self) -> bool {
    let rest = self
      .endpoint
      .strip_prefix("http://")
      .or_else(|| self.endpoint.strip_prefix("https://"))
      .unwrap_or(&self.endpoint);
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0") || rest.starts_with("[::1]")
  }

  pub fn model(&self) -> Option<&str> {
    self.model.as_deref().or_else(|| self.wire_format.default_model())
  }
}

// ============================================================================
// Request / Retry Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
  /// Per-call timeout in seconds (default: 30)
  pub timeout_secs: u64,
}

impl Default for RequestConfig {
  fn default() -> Self {
    Self { timeout_secs: 30 }
  }
}

/// Retry behaviour for transient failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  /// Maximum retries after the first attempt (default: 3)
  pub max_retries: u32,

  /// Delay before the first retry in milliseconds (default: 1000)
  pub initial_backoff_ms: u64,

  /// Upper bound on any single delay in milliseconds (default: 30000)
  pub max_backoff_ms: u64,

  /// Backoff growth per attempt (default: 2.0)
  pub backoff_multiplier: f64,

  /// Add up to 25% random jitter to each delay (default: true)
  pub jitter: bool,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff_ms: 1000,
      max_backoff_ms: 30_000,
      backoff_multiplier: 2.0,
      jitter: true,
    }
  }
}

// ============================================================================
// Cache / Coordinator Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Maximum number of cached responses (default: 256)
  pub max_entries: usize,

  /// Maximum total size estimate in bytes (default: 16MB)
  pub max_bytes: usize,

  /// Maximum entry age in seconds (0 = no age limit)
  pub max_age_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_entries: 256,
      max_bytes: 16 * 1024 * 1024, // 16MB
      max_age_secs: 0,
    }
  }
}

impl CacheConfig {
  pub fn max_age(&self) -> Option<Duration> {
    (self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
  /// Maximum simultaneous outbound calls (default: 4)
  pub max_concurrent: usize,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self { max_concurrent: 4 }
  }
}

// ============================================================================
// Prompt Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
  #[default]
  Explain,
  Security,
  Malware,
  Custom,
}

impl std::str::FromStr for PromptKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "explain" => Ok(PromptKind::Explain),
      "security" => Ok(PromptKind::Security),
      "malware" => Ok(PromptKind::Malware),
      "custom" => Ok(PromptKind::Custom),
      _ => Err(format!("Invalid prompt kind: {}", s)),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
  /// Prompt kind: explain, security, malware, custom
  pub kind: PromptKind,

  /// Instruction text for `kind = "custom"`
  #[serde(skip_serializing_if = "Option::is_none")]
  pub custom: Option<String>,

  /// Code context budget in estimated tokens (default: 8000)
  pub max_context_tokens: usize,
}

impl Default for PromptConfig {
  fn default() -> Self {
    Self {
      kind: PromptKind::Explain,
      custom: None,
      max_context_tokens: 8000,
    }
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  pub level: String,

  /// Write logs to files in this directory instead of stderr
  #[serde(skip_serializing_if = "Option::is_none")]
  pub directory: Option<PathBuf>,

  /// Log file rotation: "daily", "hourly", "never"
  pub rotation: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
      rotation: "daily".to_string(),
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub service: ServiceConfig,
  pub request: RequestConfig,
  pub retry: RetryConfig,
  pub cache: CacheConfig,
  pub coordinator: CoordinatorConfig,
  pub prompt: PromptConfig,
  pub logging: LoggingConfig,
}

impl Config {
  /// Load config for a project, with fallback to user config
  pub fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(config) = Self::load_from(&project_config)
    {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(config) = Self::load_from(&user_config_path)
    {
      return config;
    }

    Self::default()
  }

  /// Load a single config file, reporting read and parse failures
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DECOMPLENS_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("decomplens").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("decomplens").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".decomplens").join("config.toml")
  }

  /// Configured API key, falling back to the environment
  pub fn api_key(&self) -> Option<String> {
    self
      .service
      .api_key
      .clone()
      .filter(|k| !k.is_empty())
      .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request.timeout_secs)
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    r#"# decomplens Configuration
# Place in .decomplens/config.toml (project) or ~/.config/decomplens/config.toml (user)

# ============================================================================
# Remote Service
# ============================================================================

[service]
endpoint = "http://localhost:8080/v1/explain"

# POST or PUT
method = "POST"

# Wire format: simple, openai, anthropic, mistral
#   simple    = { fragment, prompt, params } -> { content, contentType }
#   openai    = chat completions
#   anthropic = messages API
#   mistral   = chat completions (hosted or self-hosted)
wire_format = "simple"

# Authentication: bearer, header, none
# Defaults to the x-api-key header for anthropic, bearer otherwise
# auth = "bearer"
# auth_header = "x-api-key"

# Can also be set via DECOMPLENS_API_KEY env var
# api_key = "sk-..."

# Model name (chat wire formats only)
# model = "gpt-4o-mini"

max_tokens = 4096
temperature = 0.7

# ============================================================================
# Requests & Retries
# ============================================================================

[request]
# Per-call timeout (seconds)
timeout_secs = 30

[retry]
# Retries after the first attempt for network errors, timeouts, 429 and 5xx
max_retries = 3
initial_backoff_ms = 1000
max_backoff_ms = 30000
backoff_multiplier = 2.0
jitter = true

# ============================================================================
# Response Cache
# ============================================================================

[cache]
max_entries = 256
max_bytes = 16777216  # 16MB

# Maximum entry age (seconds, 0 = no limit)
max_age_secs = 0

[coordinator]
# Maximum simultaneous outbound calls
max_concurrent = 4

# ============================================================================
# Prompt
# ============================================================================

[prompt]
# Prompt kind: explain, security, malware, custom
kind = "explain"

# Instruction text used when kind = "custom"
# custom = "Summarize what this class does."

# Code context budget (estimated tokens, ~4 chars each)
max_context_tokens = 8000

# ============================================================================
# Logging
# ============================================================================

[logging]
# Log level: off, error, warn, info, debug, trace
level = "info"

# Write logs to files in this directory instead of stderr
# directory = "/tmp/decomplens-logs"

# Log rotation: daily, hourly, never
rotation = "daily"
"#
    .to_string()
  }
}
