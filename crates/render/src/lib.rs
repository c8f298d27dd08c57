//! Response rendering
//!
//! Turns a `RawResponse` into a `RenderedDocument`. Rendering is pure: code
//! blocks are only demarcated and tagged with a language, never highlighted.

mod language;
mod markdown;

use lens_core::{ContentType, Inline, ProseBlock, ProseStyle, QueryError, RawResponse, RenderedDocument};
use tracing::debug;

pub use language::infer as infer_language;

pub fn render(raw: &RawResponse) -> Result<RenderedDocument, QueryError> {
  let result = match raw.content_type {
    ContentType::Plain => Ok(render_plain(&raw.content)),
    ContentType::Markdown => markdown::parse(&raw.content),
  };

  match &result {
    Ok(doc) => debug!(blocks = doc.len(), content_len = raw.content.len(), "Rendered response"),
    Err(e) => debug!(error = %e, "Response failed to render"),
  }
  result
}

fn render_plain(content: &str) -> RenderedDocument {
  let text = content.trim();
  if text.is_empty() {
    return RenderedDocument::default();
  }
  RenderedDocument::new(vec![lens_core::Block::Prose(ProseBlock::new(
    ProseStyle::Paragraph,
    vec![Inline::Text(text.to_string())],
  ))])
}
