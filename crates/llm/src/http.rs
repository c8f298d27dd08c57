use std::time::{Duration, Instant};

use async_trait::async_trait;
use lens_core::{
  CodeFragment, Config, QueryError, QueryParams, RawResponse,
  config::{AuthScheme, HttpMethod, PromptConfig, ServiceConfig, WireFormat},
};
use tracing::{debug, error, trace, warn};

use crate::{
  QueryClient, prompts,
  wire::{self, ANTHROPIC_VERSION},
};

/// Longest error body kept in `ServerError` messages
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
  #[error("{0} endpoint requires an API key (set [service] api_key or DECOMPLENS_API_KEY)")]
  NotConfigured(String),
  #[error("Invalid endpoint URL: {0}")]
  InvalidEndpoint(String),
  #[error("Failed to build HTTP client: {0}")]
  Build(#[from] reqwest::Error),
}

/// `QueryClient` that talks to a configured HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpQueryClient {
  client: reqwest::Client,
  service: ServiceConfig,
  prompt: PromptConfig,
  api_key: Option<String>,
  timeout: Duration,
}

impl HttpQueryClient {
  pub fn from_config(config: &Config) -> Result<Self, ClientError> {
    let service = config.service.clone();
    let api_key = config.api_key();

    if !service.endpoint.starts_with("http://") && !service.endpoint.starts_with("https://") {
      return Err(ClientError::InvalidEndpoint(service.endpoint));
    }

    // Hosted chat services reject anonymous requests; a local endpoint may not need a key
    if service.wire_format != WireFormat::Simple && !service.is_local() && api_key.is_none() {
      return Err(ClientError::NotConfigured(service.wire_format.as_str().to_string()));
    }

    let timeout = config.request_timeout();
    let client = reqwest::Client::builder()
      .connect_timeout(timeout)
      .timeout(timeout)
      .build()?;

    debug!(
      endpoint = %service.endpoint,
      wire_format = service.wire_format.as_str(),
      has_api_key = api_key.is_some(),
      timeout_secs = timeout.as_secs(),
      "HTTP query client initialized"
    );

    Ok(Self {
      client,
      service,
      prompt: config.prompt.clone(),
      api_key,
      timeout,
    })
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  fn request_builder(&self) -> reqwest::RequestBuilder {
    let builder = match self.service.method {
      HttpMethod::Post => self.client.post(&self.service.endpoint),
      HttpMethod::Put => self.client.put(&self.service.endpoint),
    };

    let builder = match (self.service.auth_scheme(self.api_key.is_some()), &self.api_key) {
      (AuthScheme::Bearer, Some(key)) => builder.bearer_auth(key),
      (AuthScheme::Header, Some(key)) => builder.header(self.service.auth_header_name(), key),
      _ => builder,
    };

    if self.service.wire_format == WireFormat::Anthropic {
      builder.header("anthropic-version", ANTHROPIC_VERSION)
    } else {
      builder
    }
  }
}

#[async_trait]
impl QueryClient for HttpQueryClient {
  fn name(&self) -> &str {
    self.service.wire_format.as_str()
  }

  async fn send(&self, fragment: &CodeFragment, params: &QueryParams) -> Result<RawResponse, QueryError> {
    let prompt = prompts::build_prompt(&self.prompt, fragment, params);
    let body = wire::encode(&self.service, fragment, &prompt, params);

    trace!(
      unit = %fragment.id(),
      endpoint = %self.service.endpoint,
      prompt_len = prompt.len(),
      "Sending query"
    );
    let start = Instant::now();

    let response = match self.request_builder().json(&body).send().await {
      Ok(resp) => resp,
      Err(e) => {
        if e.is_timeout() {
          warn!(unit = %fragment.id(), elapsed_ms = start.elapsed().as_millis(), "Query timed out");
          return Err(QueryError::Timeout);
        }
        warn!(unit = %fragment.id(), error = %e, "Network error sending query");
        return Err(QueryError::network(e.to_string()));
      }
    };

    let status = response.status();
    trace!(
      status = %status,
      elapsed_ms = start.elapsed().as_millis(),
      "Received response"
    );

    if !status.is_success() {
      let status_code = status.as_u16();
      let retry_after = parse_retry_after(response.headers());
      let body = response.text().await.unwrap_or_default();

      if status_code == 401 || status_code == 403 {
        error!(status = %status, endpoint = %self.service.endpoint, "Remote service authentication failed");
      } else {
        warn!(status = %status, retry_after_secs = retry_after.map(|d| d.as_secs()), "Query failed");
      }

      return Err(QueryError::from_status(status_code, truncate_body(&body), retry_after));
    }

    let body = match response.text().await {
      Ok(body) => body,
      Err(e) if e.is_timeout() => return Err(QueryError::Timeout),
      Err(e) => return Err(QueryError::network(e.to_string())),
    };

    let raw = wire::decode(self.service.wire_format, &body)?;
    debug!(
      unit = %fragment.id(),
      content_len = raw.content.len(),
      elapsed_ms = start.elapsed().as_millis(),
      "Query succeeded"
    );
    Ok(raw)
  }
}

/// `Retry-After` in delta-seconds form
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
  headers
    .get(reqwest::header::RETRY_AFTER)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.trim().parse::<u64>().ok())
    .map(Duration::from_secs)
}

fn truncate_body(body: &str) -> String {
  if body.chars().count() <= MAX_ERROR_BODY_CHARS {
    return body.to_string();
  }
  let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
  truncated.push_str("...");
  truncated
}
