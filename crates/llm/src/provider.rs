//! Query client trait
//!
//! This module defines the `QueryClient` trait that remote backends implement.
//! A client performs exactly one outbound call per `send` and never retries;
//! retry policy belongs to the caller.

use async_trait::async_trait;
use lens_core::{CodeFragment, QueryError, QueryParams, RawResponse};

/// Trait for remote query backends
///
/// # Example
///
/// ```ignore
/// use llm::QueryClient;
/// use lens_core::{CodeFragment, QueryError, QueryParams, RawResponse};
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl QueryClient for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn send(&self, fragment: &CodeFragment, _params: &QueryParams) -> Result<RawResponse, QueryError> {
///         Ok(RawResponse::plain(fragment.text()))
///     }
/// }
/// ```
#[async_trait]
pub trait QueryClient: Send + Sync {
  /// The name of this client (for logging/identification)
  fn name(&self) -> &str;

  /// Perform one outbound call for the fragment
  ///
  /// Failures are classified into `QueryError` so the caller can decide
  /// whether a retry makes sense.
  async fn send(&self, fragment: &CodeFragment, params: &QueryParams) -> Result<RawResponse, QueryError>;
}
