pub mod config;
mod document;
mod error;
mod fingerprint;
mod fragment;
mod response;

pub use config::Config;
pub use document::{Block, CodeBlock, Inline, ProseBlock, ProseStyle, RenderedDocument};
pub use error::QueryError;
pub use fingerprint::{RequestKey, key};
pub use fragment::{CHARS_PER_TOKEN, CodeFragment, FragmentId, Language, QueryParams, estimate_tokens};
pub use response::{ContentType, RawResponse};
