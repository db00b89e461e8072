use clap::Subcommand;

use super::config::ConfigArgs;
use super::consume::ConsumeArgs;
use super::fetch::FetchArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Take units from the configured quota
    Consume(ConsumeArgs),

    /// Refresh the window bookkeeping and show the quota state
    Drain,

    /// Send GET requests through the admission layer
    Fetch(FetchArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),
}
