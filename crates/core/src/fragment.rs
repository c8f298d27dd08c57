use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Characters per token estimate (for LLM token counting)
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate token count from content length
pub fn estimate_tokens(text: &str) -> usize {
  text.len() / CHARS_PER_TOKEN
}

/// Where a fragment came from: the source unit (class, file) plus an
/// optional location inside it (method signature, line range).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentId {
  pub unit: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

impl FragmentId {
  pub fn new(unit: impl Into<String>) -> Self {
    Self {
      unit: unit.into(),
      location: None,
    }
  }
}

impl std::fmt::Display for FragmentId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.location {
      Some(location) => write!(f, "{}@{}", self.unit, location),
      None => write!(f, "{}", self.unit),
    }
  }
}

/// A unit of decompiled source submitted for remote processing.
///
/// Immutable once captured: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeFragment {
  id: FragmentId,
  language: Language,
  text: String,
}

impl CodeFragment {
  pub fn new(unit: impl Into<String>, text: impl Into<String>, language: Language) -> Self {
    Self {
      id: FragmentId::new(unit),
      language,
      text: text.into(),
    }
  }

  /// Attach a location (method, line range) inside the source unit
  pub fn with_location(mut self, location: impl Into<String>) -> Self {
    self.id.location = Some(location.into());
    self
  }

  pub fn id(&self) -> &FragmentId {
    &self.id
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn language(&self) -> Language {
    self.language
  }
}

/// Request parameters, kept sorted by name so that serialization is
/// independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style insert
  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.insert(name, value);
    self
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
    self.0.insert(name.into(), value.into())
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.0.get(name).map(String::as_str)
  }

  /// Parameters in ascending name order
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

impl From<BTreeMap<String, String>> for QueryParams {
  fn from(map: BTreeMap<String, String>) -> Self {
    Self(map)
  }
}

impl From<HashMap<String, String>> for QueryParams {
  fn from(map: HashMap<String, String>) -> Self {
    map.into_iter().collect()
  }
}

/// Languages the decompiler emits and the display surface can highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  Java,
  Kotlin,
  Smali,
  Xml,
  Json,
  Python,
  JavaScript,
  #[default]
  Text,
}

impl Language {
  pub fn as_str(&self) -> &'static str {
    match self {
      Language::Java => "java",
      Language::Kotlin => "kotlin",
      Language::Smali => "smali",
      Language::Xml => "xml",
      Language::Json => "json",
      Language::Python => "python",
      Language::JavaScript => "javascript",
      Language::Text => "text",
    }
  }

  /// Resolve a code fence info tag (`java`, `kt`, `js`, ...)
  pub fn from_tag(tag: &str) -> Option<Self> {
    match tag.trim().to_lowercase().as_str() {
      "java" => Some(Language::Java),
      "kotlin" | "kt" | "kts" => Some(Language::Kotlin),
      "smali" => Some(Language::Smali),
      "xml" | "html" | "svg" => Some(Language::Xml),
      "json" | "jsonc" => Some(Language::Json),
      "python" | "py" => Some(Language::Python),
      "javascript" | "js" | "mjs" => Some(Language::JavaScript),
      "text" | "plain" | "txt" | "plaintext" => Some(Language::Text),
      _ => None,
    }
  }

  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext.to_lowercase().as_str() {
      "java" => Some(Language::Java),
      "kt" | "kts" => Some(Language::Kotlin),
      "smali" => Some(Language::Smali),
      "xml" => Some(Language::Xml),
      "json" => Some(Language::Json),
      "py" => Some(Language::Python),
      "js" | "mjs" | "cjs" => Some(Language::JavaScript),
      "txt" => Some(Language::Text),
      _ => None,
    }
  }
}

impl std::fmt::Display for Language {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
