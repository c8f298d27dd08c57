//! Query commands (explain, key, render)

use std::{
  io::Read,
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::{Context, Result, bail};
use decomplens::{
  CodeFragment, Config, Coordinator, Language, PARAM_PROMPT, PARAM_QUESTION, QueryParams, RenderedDocument,
};
use futures::future::join_all;
use lens_core::{ContentType, RawResponse};
use tracing::{debug, error};

use crate::format::format_document;

/// Inputs shared by `explain` and `key`
pub struct FragmentArgs {
  pub unit: Option<String>,
  pub location: Option<String>,
  pub language: Option<String>,
  pub question: Option<String>,
  pub prompt: Option<String>,
  pub params: Vec<(String, String)>,
}

impl FragmentArgs {
  fn query_params(&self) -> QueryParams {
    let mut params: QueryParams = self.params.iter().cloned().collect();
    if let Some(question) = &self.question {
      params.insert(PARAM_QUESTION, question);
    }
    if let Some(prompt) = &self.prompt {
      params.insert(PARAM_PROMPT, prompt);
    }
    params
  }

  fn explicit_language(&self) -> Result<Option<Language>> {
    match &self.language {
      Some(tag) => match Language::from_tag(tag) {
        Some(language) => Ok(Some(language)),
        None => bail!("Unknown language: {}", tag),
      },
      None => Ok(None),
    }
  }
}

/// Read a source file into a fragment.
///
/// The unit defaults to the file stem and the language to the one implied
/// by the extension.
pub fn load_fragment(path: &Path, args: &FragmentArgs) -> Result<CodeFragment> {
  let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

  let language = match args.explicit_language()? {
    Some(language) => language,
    None => path
      .extension()
      .and_then(|e| e.to_str())
      .and_then(Language::from_extension)
      .unwrap_or_default(),
  };

  let unit = args.unit.clone().unwrap_or_else(|| {
    path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string())
  });

  let fragment = CodeFragment::new(unit, text, language);
  Ok(match &args.location {
    Some(location) => fragment.with_location(location),
    None => fragment,
  })
}

/// Ask the remote service about one or more files.
///
/// All files are submitted at once; the coordinator limits how many calls
/// run concurrently and answers duplicates with a single call.
pub async fn cmd_explain(
  files: &[PathBuf],
  args: &FragmentArgs,
  json: bool,
  timeout: Option<u64>,
  show_stats: bool,
) -> Result<()> {
  let cwd = std::env::current_dir()?;
  let config = Config::load_for_project(&cwd);
  let coordinator = Coordinator::from_config(&config).context("Failed to create query client")?;
  let params = args.query_params();

  let fragments = files
    .iter()
    .map(|path| load_fragment(path, args))
    .collect::<Result<Vec<_>>>()?;

  let handles: Vec<_> = fragments
    .iter()
    .map(|fragment| {
      let handle = coordinator.request(fragment, &params);
      debug!(unit = %fragment.id(), key = %handle.key().short(), "Submitted");
      handle
    })
    .collect();

  let results = match timeout {
    Some(secs) => {
      let deadline = Duration::from_secs(secs);
      join_all(handles.into_iter().map(|h| h.wait_timeout(deadline))).await
    }
    None => join_all(handles).await,
  };

  let mut failures = 0;
  let mut documents = Vec::new();
  for (path, result) in files.iter().zip(results) {
    match result {
      Ok(doc) => documents.push((path, doc)),
      Err(e) => {
        failures += 1;
        error!(file = %path.display(), kind = e.kind(), "{}", e);
      }
    }
  }

  if json {
    let values: Vec<serde_json::Value> = documents
      .iter()
      .map(|(path, doc)| {
        serde_json::json!({
          "file": path.display().to_string(),
          "document": doc.as_ref(),
        })
      })
      .collect();
    println!("{}", serde_json::to_string_pretty(&values)?);
  } else {
    print_documents(&documents, files.len() > 1);
  }

  if show_stats {
    let stats = coordinator.stats();
    eprintln!(
      "calls: {}  retries: {}  cache hits: {}  joined: {}  cancelled: {}",
      stats.outbound_calls, stats.retries, stats.cache_hits, stats.joined, stats.cancelled
    );
  }

  if failures > 0 {
    bail!("{} of {} requests failed", failures, files.len());
  }
  Ok(())
}

fn print_documents(documents: &[(&PathBuf, std::sync::Arc<RenderedDocument>)], with_headers: bool) {
  for (i, (path, doc)) in documents.iter().enumerate() {
    if with_headers {
      if i > 0 {
        println!();
      }
      println!("==> {} <==", path.display());
    }
    print!("{}", format_document(doc));
  }
}

/// Print the request key for a file and parameters
pub async fn cmd_key(file: &Path, args: &FragmentArgs) -> Result<()> {
  let fragment = load_fragment(file, args)?;
  let key = lens_core::key(&fragment, &args.query_params());
  println!("{}", key);
  Ok(())
}

/// Render a local response body without contacting the service.
///
/// `-` reads from stdin.
pub async fn cmd_render(file: &Path, plain: bool, json: bool) -> Result<()> {
  let content = if file == Path::new("-") {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
    buf
  } else {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?
  };

  let content_type = if plain { ContentType::Plain } else { ContentType::Markdown };
  let doc = decomplens::render(&RawResponse::new(content, content_type))?;

  if json {
    println!("{}", serde_json::to_string_pretty(&doc)?);
  } else {
    print!("{}", format_document(&doc));
  }
  Ok(())
}
