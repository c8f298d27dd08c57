//! Render-ready documents
//!
//! A `RenderedDocument` is an ordered list of prose and code blocks. It is
//! built once per successful response and never mutated afterwards; the
//! display surface owns highlighting and layout.

use serde::Serialize;

use crate::Language;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
  blocks: Vec<Block>,
}

impl RenderedDocument {
  pub fn new(blocks: Vec<Block>) -> Self {
    Self { blocks }
  }

  pub fn blocks(&self) -> &[Block] {
    &self.blocks
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  pub fn prose(&self) -> impl Iterator<Item = &ProseBlock> {
    self.blocks.iter().filter_map(|b| match b {
      Block::Prose(p) => Some(p),
      Block::Code(_) => None,
    })
  }

  pub fn code(&self) -> impl Iterator<Item = &CodeBlock> {
    self.blocks.iter().filter_map(|b| match b {
      Block::Code(c) => Some(c),
      Block::Prose(_) => None,
    })
  }

  /// Plain-text rendition for clipboard copies: prose text and code bodies
  /// separated by blank lines.
  pub fn plain_text(&self) -> String {
    self
      .blocks
      .iter()
      .map(|b| match b {
        Block::Prose(p) => p.text(),
        Block::Code(c) => c.text.clone(),
      })
      .collect::<Vec<_>>()
      .join("\n\n")
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
  Prose(ProseBlock),
  Code(CodeBlock),
}

/// Markdown-derived text with its block style and inline spans
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProseBlock {
  pub style: ProseStyle,
  pub spans: Vec<Inline>,
}

impl ProseBlock {
  pub fn new(style: ProseStyle, spans: Vec<Inline>) -> Self {
    Self { style, spans }
  }

  /// Prose text with inline markup removed
  pub fn text(&self) -> String {
    self.spans.iter().map(Inline::text).collect()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProseStyle {
  Paragraph,
  Heading { level: u8 },
  ListItem { ordered: bool },
  Quote,
  Table,
  Rule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Inline {
  Text(String),
  Strong(String),
  Emphasis(String),
  Code(String),
  Link { text: String, url: String },
}

impl Inline {
  pub fn text(&self) -> &str {
    match self {
      Inline::Text(s) | Inline::Strong(s) | Inline::Emphasis(s) | Inline::Code(s) => s,
      Inline::Link { text, .. } => text,
    }
  }
}

/// A demarcated code span. `tag` is the declared fence language or, when
/// `declared` is false, the inferred one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
  pub tag: String,
  pub declared: bool,
  pub text: String,
}

impl CodeBlock {
  /// Highlighting style for the display surface; unknown tags fall back to
  /// plain text.
  pub fn syntax(&self) -> Language {
    Language::from_tag(&self.tag).unwrap_or_default()
  }
}
