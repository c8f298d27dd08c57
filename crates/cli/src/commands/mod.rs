//! CLI command implementations

mod config;
mod explain;

pub use config::{cmd_config_init, cmd_config_path, cmd_config_show};
pub use explain::{FragmentArgs, cmd_explain, cmd_key, cmd_render};
