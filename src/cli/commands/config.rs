//! Config command - show configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::RbpackResult;

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager) -> RbpackResult<()> {
    match args.action {
        None => show_config(&manager.load().await?)?,
        Some(ConfigAction::Show { build_dir }) => {
            show_config(&manager.load_for_build(build_dir.as_deref()).await?)?
        }
        Some(ConfigAction::Path) => show_path(manager),
    }

    Ok(())
}

fn show_config(config: &Config) -> RbpackResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}
