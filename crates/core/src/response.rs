use serde::{Deserialize, Serialize};

/// How the response content should be interpreted by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
  #[default]
  Markdown,
  Plain,
}

/// Response payload as returned by the remote service.
///
/// Wire shape: `{ "content": string, "contentType": "markdown" | "plain" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResponse {
  pub content: String,
  pub content_type: ContentType,
}

impl RawResponse {
  pub fn new(content: impl Into<String>, content_type: ContentType) -> Self {
    Self {
      content: content.into(),
      content_type,
    }
  }

  pub fn markdown(content: impl Into<String>) -> Self {
    Self::new(content, ContentType::Markdown)
  }

  pub fn plain(content: impl Into<String>) -> Self {
    Self::new(content, ContentType::Plain)
  }

  /// Approximate heap + inline size, used for cache byte accounting
  pub fn size_estimate(&self) -> usize {
    std::mem::size_of::<Self>() + self.content.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_wire_shape() {
    let raw: RawResponse = serde_json::from_str(r#"{"content":"hi","contentType":"plain"}"#).unwrap();
    assert_eq!(raw, RawResponse::plain("hi"));

    let json = serde_json::to_value(RawResponse::markdown("# x")).unwrap();
    assert_eq!(json["contentType"], "markdown");
    assert_eq!(json["content"], "# x");
  }

  #[test]
  fn test_unknown_content_type_rejected() {
    let result = serde_json::from_str::<RawResponse>(r#"{"content":"hi","contentType":"html"}"#);
    assert!(result.is_err());
  }

  #[test]
  fn test_size_estimate_grows_with_content() {
    let small = RawResponse::plain("a");
    let large = RawResponse::plain("a".repeat(1000));
    assert_eq!(large.size_estimate() - small.size_estimate(), 999);
  }
}
