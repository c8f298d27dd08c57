//! Request coordination for decompiler-side code queries
//!
//! Ties the fingerprint keyer, response cache, remote query client and
//! renderer together behind [`Coordinator::request`].

mod cache;
mod coordinator;
mod retry;

pub use cache::{CacheStats, CachedResponse, ResponseCache};
pub use coordinator::{CancelHandle, Coordinator, CoordinatorOptions, CoordinatorStats, Outcome, RequestHandle};
pub use lens_core::{CodeFragment, Config, Language, QueryError, QueryParams, RenderedDocument, RequestKey};
pub use llm::{
  ClientError, HttpQueryClient, QueryClient,
  prompts::{PARAM_PROMPT, PARAM_QUESTION},
};
pub use render::render;
pub use retry::RetryPolicy;
