//! Remote query clients
//!
//! `QueryClient` is the seam between request orchestration and the network.
//! `HttpQueryClient` builds the prompt, encodes it in the configured wire
//! format, performs one HTTP call and classifies the outcome.

mod http;
pub mod prompts;
mod provider;
pub mod wire;

pub use http::{ClientError, HttpQueryClient};
pub use provider::QueryClient;
