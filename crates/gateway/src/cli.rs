//! Command-line interface for the `banter` binary.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "banter", about = "Streaming conversational inference gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway server (the default).
    Serve,
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version and exit.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Dump the resolved configuration as JSON (the API key is omitted).
    Show,
    /// Validate the environment-derived configuration.
    Validate,
}
