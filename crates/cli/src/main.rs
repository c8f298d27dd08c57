//! decomplens CLI - Explain decompiled code with a remote analysis service

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use decomplens::Config;

mod commands;
mod format;
mod logging;

use commands::{FragmentArgs, cmd_config_init, cmd_config_path, cmd_config_show, cmd_explain, cmd_key, cmd_render};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "decomplens")]
#[command(about = "Explain decompiled code with a remote analysis service")]
#[command(after_help = "\
QUICK START:
  decomplens config init              # Create .decomplens/config.toml
  decomplens explain Foo.java         # Ask about a file
  decomplens explain *.smali --stats  # Many files, shared concurrency limit

RENDERING:
  decomplens render answer.md         # Render a saved response offline")]
struct Cli {
  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

/// Fragment and parameter options shared by `explain` and `key`
#[derive(clap::Args)]
struct QueryOpts {
  /// Source unit name (default: file stem)
  #[arg(long)]
  unit: Option<String>,
  /// Location inside the unit, e.g. a method signature
  #[arg(long)]
  location: Option<String>,
  /// Source language (default: from file extension)
  #[arg(short, long)]
  language: Option<String>,
  /// Question to ask about the code
  #[arg(short, long)]
  question: Option<String>,
  /// Prompt kind (explain, security, malware, custom) or instruction text
  /// used in place of the configured prompt
  #[arg(long)]
  prompt: Option<String>,
  /// Extra request parameter (repeatable)
  #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
  params: Vec<(String, String)>,
}

impl From<QueryOpts> for FragmentArgs {
  fn from(opts: QueryOpts) -> Self {
    Self {
      unit: opts.unit,
      location: opts.location,
      language: opts.language,
      question: opts.question,
      prompt: opts.prompt,
      params: opts.params,
    }
  }
}

/// Subcommands for `decomplens config`
#[derive(Subcommand)]
enum ConfigCommand {
  /// Show current effective configuration
  Show,
  /// Write a commented config template
  Init {
    /// Write the user config instead of the project config
    #[arg(long)]
    user: bool,
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
  /// Show config file locations
  Path,
}

#[derive(Subcommand)]
enum Commands {
  /// Explain one or more source files
  #[command(after_help = "\
EXAMPLES:
  decomplens explain MainActivity.java
  decomplens explain Foo.smali -q \"What does onCreate do?\"
  decomplens explain Foo.java -p depth=brief --json
  decomplens explain a.java b.java --timeout 60")]
  Explain {
    /// Source files
    #[arg(required = true)]
    files: Vec<PathBuf>,
    #[command(flatten)]
    query: QueryOpts,
    /// Output rendered documents as JSON
    #[arg(long)]
    json: bool,
    /// Give up waiting after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Print request statistics to stderr
    #[arg(long)]
    stats: bool,
  },
  /// Print the request key for a file and parameters
  Key {
    file: PathBuf,
    #[command(flatten)]
    query: QueryOpts,
  },
  /// Render a saved response (markdown by default, `-` for stdin)
  Render {
    file: PathBuf,
    /// Treat the content as plain text
    #[arg(long)]
    plain: bool,
    /// Output the document as JSON
    #[arg(long)]
    json: bool,
  },
  /// Manage configuration
  #[command(after_help = "\
CONFIG LOCATIONS:
  Project: .decomplens/config.toml
  User:    ~/.config/decomplens/config.toml")]
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

/// Parse a `KEY=VALUE` request parameter
fn parse_param(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
    _ => Err(format!("expected KEY=VALUE, got `{}`", s)),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
  let config = Config::load_for_project(&cwd);
  let _guard = init_logging(&config.logging, cli.verbose);

  match cli.command {
    Commands::Explain {
      files,
      query,
      json,
      timeout,
      stats,
    } => cmd_explain(&files, &query.into(), json, timeout, stats).await,
    Commands::Key { file, query } => cmd_key(&file, &query.into()).await,
    Commands::Render { file, plain, json } => cmd_render(&file, plain, json).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show().await,
      ConfigCommand::Init { user, force } => cmd_config_init(user, force).await,
      ConfigCommand::Path => cmd_config_path().await,
    },
  }
}
