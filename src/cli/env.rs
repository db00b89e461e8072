use clap::Parser;
use std::path::PathBuf;

use super::backend::BackendKind;
use super::commands::Commands;
use super::output::OutputFormat;

/// quota-gate - shared request quota across replicas
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, default_value = "human")]
    pub output: OutputFormat,

    /// Store backend, overriding the configuration file
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Commands,
}
