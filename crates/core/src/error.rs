use std::time::Duration;

/// Errors that can occur while querying the remote service.
///
/// `Clone` so that every waiter on one in-flight request observes the same
/// value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
  #[error("Network error: {0}")]
  Network(String),
  #[error("Request timed out")]
  Timeout,
  #[error("Rate limited by remote service")]
  RateLimited { retry_after: Option<Duration> },
  #[error("Server returned {code}: {message}")]
  ServerError { code: u16, message: String },
  #[error("Malformed response: {0}")]
  Malformed(String),
  #[error("Request cancelled")]
  Cancelled,
}

impl QueryError {
  pub fn network(msg: impl Into<String>) -> Self {
    Self::Network(msg.into())
  }

  pub fn malformed(msg: impl Into<String>) -> Self {
    Self::Malformed(msg.into())
  }

  /// Classify a non-2xx HTTP status. 429 is rate limiting; everything else
  /// is a server error carrying the status code.
  pub fn from_status(code: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
    if code == 429 {
      Self::RateLimited { retry_after }
    } else {
      Self::ServerError {
        code,
        message: message.into(),
      }
    }
  }

  /// Whether retrying the same request may succeed.
  ///
  /// 5xx server errors count as transient alongside network failures,
  /// timeouts and rate limiting.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Network(_) | Self::Timeout | Self::RateLimited { .. } => true,
      Self::ServerError { code, .. } => *code >= 500,
      Self::Malformed(_) | Self::Cancelled => false,
    }
  }

  /// Errors that surface immediately without retry
  pub fn is_permanent(&self) -> bool {
    !self.is_transient() && !matches!(self, Self::Cancelled)
  }

  /// Short label for log fields
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Network(_) => "network",
      Self::Timeout => "timeout",
      Self::RateLimited { .. } => "rate_limited",
      Self::ServerError { .. } => "server_error",
      Self::Malformed(_) => "malformed",
      Self::Cancelled => "cancelled",
    }
  }

  /// Minimum delay the server asked for, if any
  pub fn retry_after(&self) -> Option<Duration> {
    match self {
      Self::RateLimited { retry_after } => *retry_after,
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status() {
    assert_eq!(
      QueryError::from_status(429, "slow down", Some(Duration::from_secs(2))),
      QueryError::RateLimited {
        retry_after: Some(Duration::from_secs(2))
      }
    );
    assert_eq!(
      QueryError::from_status(400, "bad request", None),
      QueryError::ServerError {
        code: 400,
        message: "bad request".to_string()
      }
    );
  }

  #[test]
  fn test_transient_classification() {
    assert!(QueryError::network("connection reset").is_transient());
    assert!(QueryError::Timeout.is_transient());
    assert!(QueryError::RateLimited { retry_after: None }.is_transient());
    assert!(QueryError::from_status(503, "unavailable", None).is_transient());

    assert!(QueryError::from_status(400, "bad", None).is_permanent());
    assert!(QueryError::from_status(401, "unauthorized", None).is_permanent());
    assert!(QueryError::malformed("missing content").is_permanent());
  }

  #[test]
  fn test_cancelled_is_neither() {
    assert!(!QueryError::Cancelled.is_transient());
    assert!(!QueryError::Cancelled.is_permanent());
  }

  #[test]
  fn test_display() {
    let err = QueryError::from_status(500, "boom", None);
    assert_eq!(err.to_string(), "Server returned 500: boom");
    assert_eq!(err.kind(), "server_error");
  }
}
