//! Prompt templates and code context preparation
//!
//! Decompiled code is squeezed (blank lines, indentation and brace padding
//! removed) and then truncated to the configured token budget before it is
//! placed under the analysis instruction.

use std::sync::LazyLock;

use lens_core::{
  CodeFragment, QueryParams, estimate_tokens,
  config::{PromptConfig, PromptKind},
};
use regex::Regex;
use tracing::{debug, trace};

/// Parameter that overrides the configured prompt for one request: either a
/// prompt kind or free instruction text
pub const PARAM_PROMPT: &str = "prompt";

/// Parameter appended as a follow-up question
pub const PARAM_QUESTION: &str = "question";

pub const EXPLAIN_PROMPT: &str = r#"You are an expert reverse engineer reading decompiled Android code.

Explain what the provided code does:
1. Summarize its purpose in a short paragraph
2. Walk through the important methods and the data they touch
3. Point out anything unusual about its control flow or API usage

Quote relevant code in fenced code blocks tagged with their language.

Context:
"#;

pub const SECURITY_PROMPT: &str = r#"You are an expert Android application security engineer analyzing code for security issues.

If you find potential vulnerabilities:
1. Show the exact vulnerable code in a code block
2. Provide a detailed technical analysis explaining why it's vulnerable
3. Recommend specific fixes

If no clear vulnerabilities are found in this code, identify which other classes or packages would be valuable to analyze next and explain why.

Focus ONLY on concrete findings. Do not list theoretical vulnerabilities or repeat the analysis parameters.

Context:
"#;

pub const MALWARE_PROMPT: &str = r#"Analyze the provided code for potential malicious behavior:
- Data exfiltration patterns
- Excessive permission usage
- Overlay attack techniques
- Obfuscation methods
- Command & control patterns
- Suspicious API usage

Context:
"#;

pub const GENERIC_PROMPT: &str = "Analyze the provided code:\n\n";

/// Instruction text for a prompt kind
pub fn template(kind: PromptKind, custom: Option<&str>) -> String {
  match kind {
    PromptKind::Explain => EXPLAIN_PROMPT.to_string(),
    PromptKind::Security => SECURITY_PROMPT.to_string(),
    PromptKind::Malware => MALWARE_PROMPT.to_string(),
    PromptKind::Custom => match custom.map(str::trim) {
      Some(text) if !text.is_empty() => format!("{}\n\n", text),
      _ => GENERIC_PROMPT.to_string(),
    },
  }
}

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\r?\n").expect("valid regex"));
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static LEADING_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]+").expect("valid regex"));
static OPEN_BRACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\s+").expect("valid regex"));
static CLOSE_BRACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+\}").expect("valid regex"));
static SEMICOLON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r";\s+").expect("valid regex"));
static NEWLINE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Compact decompiled code while keeping statements readable
pub fn optimize_context(code: &str) -> String {
  if code.is_empty() {
    return String::new();
  }

  let code = BLANK_LINES.replace_all(code, "\n");
  let code = SPACE_RUNS.replace_all(&code, " ");
  let code = LEADING_SPACE.replace_all(&code, "");
  let code = OPEN_BRACE.replace_all(&code, "{ ");
  let code = CLOSE_BRACE.replace_all(&code, " }");
  let code = SEMICOLON.replace_all(&code, "; ");
  let code = NEWLINE_RUNS.replace_all(&code, "\n\n");

  code.trim().to_string()
}

fn closes_block(line: &str) -> bool {
  line.contains('}') && !line.contains('{')
}

/// Keep whole lines until the token budget is spent.
///
/// When the budget runs out inside a class body, lines are still kept up to
/// and including the next closing-brace line so the excerpt ends on a block
/// boundary.
pub fn truncate_context(code: &str, max_tokens: usize) -> String {
  if estimate_tokens(code) <= max_tokens {
    return code.to_string();
  }

  let mut out = String::new();
  let mut tokens = 0;
  let mut in_class = false;

  for line in code.split('\n') {
    let line_tokens = estimate_tokens(line);
    if tokens + line_tokens > max_tokens {
      if !in_class {
        break;
      }
      if closes_block(line) {
        out.push_str(line);
        out.push('\n');
        break;
      }
    }

    out.push_str(line);
    out.push('\n');
    tokens += line_tokens;

    if line.contains("class") && line.contains('{') {
      in_class = true;
    } else if closes_block(line) {
      in_class = false;
    }
  }

  out.trim().to_string()
}

/// Build the full prompt text for one fragment
pub fn build_prompt(config: &PromptConfig, fragment: &CodeFragment, params: &QueryParams) -> String {
  // A value that names no prompt kind is instruction text for the custom template
  let (kind, custom) = match params.get(PARAM_PROMPT) {
    Some(value) => match value.parse::<PromptKind>() {
      Ok(kind) => (kind, config.custom.as_deref()),
      Err(_) => (PromptKind::Custom, Some(value)),
    },
    None => (config.kind, config.custom.as_deref()),
  };

  let optimized = optimize_context(fragment.text());
  let context = if estimate_tokens(&optimized) > config.max_context_tokens {
    debug!(
      unit = %fragment.id(),
      estimated_tokens = estimate_tokens(&optimized),
      max_tokens = config.max_context_tokens,
      "Truncating code context"
    );
    truncate_context(&optimized, config.max_context_tokens)
  } else {
    optimized
  };

  let mut prompt = template(kind, custom);
  prompt.push_str(&format!("Source: {} ({})\n", fragment.id(), fragment.language()));
  prompt.push_str(&context);

  if let Some(question) = params.get(PARAM_QUESTION).filter(|q| !q.trim().is_empty()) {
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question.trim());
  }

  trace!(
    kind = ?kind,
    context_len = context.len(),
    total_len = prompt.len(),
    "Built prompt"
  );

  prompt
}
