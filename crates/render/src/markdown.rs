//! Markdown event stream to document blocks
//!
//! Parsing is left to `pulldown-cmark` with pipe tables enabled; this module
//! only flattens its events. Fenced and indented code become code blocks,
//! everything else becomes prose with inline spans.

use std::ops::Range;

use lens_core::{Block, CodeBlock, Inline, ProseBlock, ProseStyle, QueryError, RenderedDocument};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::language;

/// Innermost container that loose text belongs to
#[derive(Clone, Copy)]
enum Container {
  Quote,
  Item { ordered: bool },
}

/// Inline markup whose nested content is flattened to one string
enum Wrapper {
  Strong(String),
  Emphasis(String),
  Link { text: String, url: String },
  Image(String),
}

impl Wrapper {
  fn push_str(&mut self, s: &str) {
    match self {
      Wrapper::Strong(t) | Wrapper::Emphasis(t) | Wrapper::Image(t) | Wrapper::Link { text: t, .. } => t.push_str(s),
    }
  }

  fn into_inline(self) -> Inline {
    match self {
      Wrapper::Strong(t) => Inline::Strong(t),
      Wrapper::Emphasis(t) => Inline::Emphasis(t),
      Wrapper::Link { text, url } => Inline::Link { text, url },
      Wrapper::Image(alt) => Inline::Text(alt),
    }
  }
}

struct OpenCode {
  info: String,
  text: String,
}

#[derive(Default)]
struct Table {
  rows: Vec<Vec<Vec<Inline>>>,
  row: Vec<Vec<Inline>>,
  cell: Vec<Inline>,
}

impl Table {
  /// Rows as `| a | b |` lines separated by newlines
  fn into_spans(self) -> Vec<Inline> {
    let mut spans = Vec::new();
    for (i, row) in self.rows.into_iter().enumerate() {
      if i > 0 {
        push_span(&mut spans, Inline::Text("\n".to_string()));
      }
      push_span(&mut spans, Inline::Text("| ".to_string()));
      for (j, cell) in row.into_iter().enumerate() {
        if j > 0 {
          push_span(&mut spans, Inline::Text(" | ".to_string()));
        }
        for span in cell {
          push_span(&mut spans, span);
        }
      }
      push_span(&mut spans, Inline::Text(" |".to_string()));
    }
    spans
  }
}

/// Append a span, merging adjacent text
fn push_span(spans: &mut Vec<Inline>, span: Inline) {
  if let (Some(Inline::Text(prev)), Inline::Text(next)) = (spans.last_mut(), &span) {
    prev.push_str(next);
    return;
  }
  spans.push(span);
}

#[derive(Default)]
struct Builder {
  blocks: Vec<Block>,
  containers: Vec<Container>,
  /// Whether each open list is ordered
  lists: Vec<bool>,
  open: Option<(ProseStyle, Vec<Inline>)>,
  wrappers: Vec<Wrapper>,
  code: Option<OpenCode>,
  table: Option<Table>,
}

impl Builder {
  fn context_style(&self) -> ProseStyle {
    match self.containers.last() {
      Some(Container::Item { ordered }) => ProseStyle::ListItem { ordered: *ordered },
      Some(Container::Quote) => ProseStyle::Quote,
      None => ProseStyle::Paragraph,
    }
  }

  fn flush(&mut self) {
    if let Some((style, spans)) = self.open.take()
      && !spans.is_empty()
    {
      self.blocks.push(Block::Prose(ProseBlock::new(style, spans)));
    }
  }

  fn span(&mut self, span: Inline) {
    let style = self.context_style();
    let spans = match &mut self.table {
      Some(table) => &mut table.cell,
      None => &mut self.open.get_or_insert_with(|| (style, Vec::new())).1,
    };
    push_span(spans, span);
  }

  fn text(&mut self, text: &str) {
    if let Some(code) = &mut self.code {
      code.text.push_str(text);
    } else if let Some(wrapper) = self.wrappers.last_mut() {
      wrapper.push_str(text);
    } else {
      self.span(Inline::Text(text.to_string()));
    }
  }

  fn close_wrapper(&mut self) {
    let Some(wrapper) = self.wrappers.pop() else {
      return;
    };
    let span = wrapper.into_inline();
    if self.wrappers.is_empty() {
      self.span(span);
    } else {
      self.text(span.text());
    }
  }

  fn close_code(&mut self) {
    let Some(code) = self.code.take() else {
      return;
    };
    let text = code.text.strip_suffix('\n').unwrap_or(&code.text).to_string();
    let block = match code.info.split_whitespace().next() {
      Some(tag) => CodeBlock {
        tag: tag.to_lowercase(),
        declared: true,
        text,
      },
      None => CodeBlock {
        tag: language::infer(&text).as_str().to_string(),
        declared: false,
        text,
      },
    };
    self.blocks.push(Block::Code(block));
  }

  fn start(&mut self, tag: Tag<'_>, content: &str, range: Range<usize>) -> Result<(), QueryError> {
    match tag {
      Tag::Paragraph => self.flush(),
      Tag::Heading { level, .. } => {
        self.flush();
        self.open = Some((ProseStyle::Heading { level: level as u8 }, Vec::new()));
      }
      Tag::BlockQuote(_) => {
        self.flush();
        self.containers.push(Container::Quote);
      }
      Tag::List(first) => {
        self.flush();
        self.lists.push(first.is_some());
      }
      Tag::Item => {
        self.flush();
        let ordered = self.lists.last().copied().unwrap_or(false);
        self.containers.push(Container::Item { ordered });
      }
      Tag::CodeBlock(kind) => {
        self.flush();
        let info = match kind {
          CodeBlockKind::Fenced(info) => {
            if !is_closed_fence(&content[range.clone()]) {
              return Err(malformed(content, range.start, "unterminated code fence"));
            }
            info.to_string()
          }
          CodeBlockKind::Indented => String::new(),
        };
        self.code = Some(OpenCode {
          info,
          text: String::new(),
        });
      }
      Tag::HtmlBlock => return Err(malformed(content, range.start, "raw HTML block")),
      Tag::Table(_) => {
        self.flush();
        self.table = Some(Table::default());
      }
      Tag::Strong => self.wrappers.push(Wrapper::Strong(String::new())),
      Tag::Emphasis => self.wrappers.push(Wrapper::Emphasis(String::new())),
      Tag::Link { dest_url, .. } => self.wrappers.push(Wrapper::Link {
        text: String::new(),
        url: dest_url.to_string(),
      }),
      Tag::Image { .. } => self.wrappers.push(Wrapper::Image(String::new())),
      _ => {}
    }
    Ok(())
  }

  fn end(&mut self, tag: TagEnd) {
    match tag {
      TagEnd::Paragraph | TagEnd::Heading(_) => self.flush(),
      TagEnd::BlockQuote(_) | TagEnd::Item => {
        self.flush();
        self.containers.pop();
      }
      TagEnd::List(_) => {
        self.flush();
        self.lists.pop();
      }
      TagEnd::CodeBlock => self.close_code(),
      TagEnd::TableCell => {
        if let Some(table) = &mut self.table {
          let cell = std::mem::take(&mut table.cell);
          table.row.push(cell);
        }
      }
      TagEnd::TableHead | TagEnd::TableRow => {
        if let Some(table) = &mut self.table {
          let row = std::mem::take(&mut table.row);
          table.rows.push(row);
        }
      }
      TagEnd::Table => {
        if let Some(table) = self.table.take() {
          self
            .blocks
            .push(Block::Prose(ProseBlock::new(ProseStyle::Table, table.into_spans())));
        }
      }
      TagEnd::Strong | TagEnd::Emphasis | TagEnd::Link | TagEnd::Image => self.close_wrapper(),
      _ => {}
    }
  }

  fn finish(mut self) -> RenderedDocument {
    self.flush();
    RenderedDocument::new(self.blocks)
  }
}

/// Whether a fenced block's source ends with a fence that closes its opening
/// one: same character, at least as long. Quote markers and indentation from
/// enclosing containers are ignored.
fn is_closed_fence(source: &str) -> bool {
  let mut lines = source
    .lines()
    .map(|l| l.trim_start_matches(|c: char| c == '>' || c.is_whitespace()).trim_end());
  let Some(open) = lines.next() else {
    return false;
  };
  let Some(marker) = open.chars().next() else {
    return false;
  };
  let len = open.chars().take_while(|&c| c == marker).count();
  lines
    .last()
    .is_some_and(|close| close.chars().count() >= len && close.chars().all(|c| c == marker))
}

fn malformed(content: &str, offset: usize, what: &str) -> QueryError {
  let line_no = content[..offset].matches('\n').count() + 1;
  QueryError::malformed(format!("line {}: {}", line_no, what))
}

pub fn parse(content: &str) -> Result<RenderedDocument, QueryError> {
  let mut builder = Builder::default();

  for (event, range) in Parser::new_ext(content, Options::ENABLE_TABLES).into_offset_iter() {
    match event {
      Event::Start(tag) => builder.start(tag, content, range)?,
      Event::End(tag) => builder.end(tag),
      Event::Text(text) => builder.text(&text),
      Event::Code(code) => {
        if builder.wrappers.is_empty() {
          builder.span(Inline::Code(code.to_string()));
        } else {
          builder.text(&code);
        }
      }
      Event::InlineHtml(html) => builder.text(&html),
      Event::Html(_) => return Err(malformed(content, range.start, "raw HTML block")),
      Event::SoftBreak => builder.text(" "),
      Event::HardBreak => builder.text("\n"),
      Event::Rule => {
        builder.flush();
        builder
          .blocks
          .push(Block::Prose(ProseBlock::new(ProseStyle::Rule, Vec::new())));
      }
      _ => {}
    }
  }

  Ok(builder.finish())
}
