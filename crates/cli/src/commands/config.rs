//! Configuration commands

use anyhow::{Context, Result, bail};
use decomplens::Config;

/// Show current effective configuration
pub async fn cmd_config_show() -> Result<()> {
  let cwd = std::env::current_dir()?;
  let config = Config::load_for_project(&cwd);

  let project_config = Config::project_config_path(&cwd);
  let user_config = Config::user_config_path();

  println!("Effective configuration for: {:?}", cwd);
  println!();

  if project_config.exists() {
    println!("Using project config: {:?}", project_config);
  } else if let Some(ref user_path) = user_config
    && user_path.exists()
  {
    println!("Using user config: {:?}", user_path);
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  // Never echo the credential itself
  let mut shown = config.clone();
  if shown.service.api_key.is_some() {
    shown.service.api_key = Some("<redacted>".to_string());
  }
  println!("{}", toml::to_string_pretty(&shown)?);

  if config.api_key().is_none() && !config.service.is_local() {
    println!("# Note: no API key configured for a remote endpoint");
    println!("# Set service.api_key or {}", lens_core::config::API_KEY_ENV);
  }

  Ok(())
}

/// Write a commented config template to the project or user location
pub async fn cmd_config_init(user: bool, force: bool) -> Result<()> {
  let config_path = if user {
    Config::user_config_path().context("Could not determine user config path")?
  } else {
    Config::project_config_path(&std::env::current_dir()?)
  };

  if config_path.exists() && !force {
    bail!(
      "Config file already exists: {:?} (use --force to overwrite)",
      config_path
    );
  }

  if let Some(parent) = config_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&config_path, Config::generate_template())
    .with_context(|| format!("Failed to write {:?}", config_path))?;

  println!("Created config: {:?}", config_path);
  println!("Edit the [service] section to point at your explanation service.");
  Ok(())
}

/// Print where config files are looked up
pub async fn cmd_config_path() -> Result<()> {
  let cwd = std::env::current_dir()?;
  println!("Project: {:?}", Config::project_config_path(&cwd));
  match Config::user_config_path() {
    Some(path) => println!("User:    {:?}", path),
    None => println!("User:    (unavailable)"),
  }
  Ok(())
}
