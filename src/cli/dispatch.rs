use anyhow::Result;

use super::commands::Commands;
use super::config::cmd_config;
use super::consume::cmd_consume;
use super::context::CliContext;
use super::drain::cmd_drain;
use super::fetch::cmd_fetch;

pub async fn dispatch(command: Commands, ctx: &CliContext) -> Result<()> {
    match command {
        Commands::Consume(args) => cmd_consume(args, ctx).await,
        Commands::Drain => cmd_drain(ctx).await,
        Commands::Fetch(args) => cmd_fetch(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
    }
}
