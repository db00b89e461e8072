use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::context::CliContext;
use super::output::{render, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (default)
    Show,

    /// Print the configuration file location
    Path,

    /// Check the quota settings without touching the store
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = ctx.effective_config();
            // YAML doubles as the human format here.
            let format = match ctx.output() {
                OutputFormat::Human => OutputFormat::Yaml,
                other => other,
            };
            println!("# {}", ctx.config_path().display());
            println!("{}", render(format, &config, |_| String::new())?);
        }
        ConfigAction::Path => {
            println!("{}", ctx.config_path().display());
        }
        ConfigAction::Validate => {
            ctx.config()
                .quota
                .bucket_config()
                .validate()
                .context("Invalid quota settings")?;
            println!("Configuration is valid");
        }
    }
    Ok(())
}
