pub mod backend;
pub mod commands;
pub mod config;
pub mod consume;
pub mod context;
pub mod dispatch;
pub mod drain;
pub mod env;
pub mod fetch;
pub mod output;

pub use commands::Commands;
pub use context::CliContext;
pub use dispatch::dispatch;
pub use env::CliArgs;
