//! Terminal formatting for rendered documents.
//!
//! Plain text only: headings are underlined, list items bulleted or
//! numbered, quotes prefixed with a bar and code blocks framed with their
//! language. No colour or highlighting.

use std::fmt::Write;

use lens_core::{Block, CodeBlock, Inline, ProseBlock, ProseStyle, RenderedDocument};

const RULE_WIDTH: usize = 40;

pub fn format_document(doc: &RenderedDocument) -> String {
  let mut out = String::new();
  let mut ordinal = 0;

  for (i, block) in doc.blocks().iter().enumerate() {
    let continues_list = i > 0 && is_list_item(block) && is_list_item(&doc.blocks()[i - 1]);

    if i > 0 && !continues_list {
      out.push('\n');
    }

    match block {
      Block::Prose(prose) => {
        // Numbering restarts after anything that is not an ordered item
        ordinal = match prose.style {
          ProseStyle::ListItem { ordered: true } => ordinal + 1,
          _ => 0,
        };
        format_prose(&mut out, prose, ordinal);
      }
      Block::Code(code) => {
        ordinal = 0;
        format_code(&mut out, code);
      }
    }
  }

  out
}

fn is_list_item(block: &Block) -> bool {
  matches!(block, Block::Prose(p) if matches!(p.style, ProseStyle::ListItem { .. }))
}

fn format_prose(out: &mut String, block: &ProseBlock, ordinal: usize) {
  let text = spans_to_text(&block.spans);
  match block.style {
    ProseStyle::Heading { level } => {
      let underline = if level <= 1 { '=' } else { '-' };
      let width = text.chars().count().max(3);
      let _ = writeln!(out, "{}", text);
      let _ = writeln!(out, "{}", underline.to_string().repeat(width));
    }
    ProseStyle::Paragraph => {
      let _ = writeln!(out, "{}", text);
    }
    ProseStyle::ListItem { ordered: false } => {
      let _ = writeln!(out, "  * {}", text);
    }
    ProseStyle::ListItem { ordered: true } => {
      let _ = writeln!(out, "  {}. {}", ordinal, text);
    }
    ProseStyle::Quote => {
      for line in text.lines() {
        let _ = writeln!(out, "  | {}", line);
      }
    }
    ProseStyle::Table => {
      for line in text.lines() {
        let _ = writeln!(out, "  {}", line);
      }
    }
    ProseStyle::Rule => {
      let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    }
  }
}

fn format_code(out: &mut String, block: &CodeBlock) {
  let label = if block.declared {
    block.tag.clone()
  } else {
    format!("{} (inferred)", block.tag)
  };
  let _ = writeln!(out, "--- {} ---", label);
  for line in block.text.lines() {
    let _ = writeln!(out, "    {}", line);
  }
  let _ = writeln!(out, "---");
}

fn spans_to_text(spans: &[Inline]) -> String {
  let mut text = String::new();
  for span in spans {
    match span {
      Inline::Text(s) | Inline::Strong(s) | Inline::Emphasis(s) => text.push_str(s),
      Inline::Code(s) => {
        text.push('`');
        text.push_str(s);
        text.push('`');
      }
      Inline::Link { text: label, url } => {
        let _ = write!(text, "{} <{}>", label, url);
      }
    }
  }
  text
}
