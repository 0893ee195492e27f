//! CLI argument parsing.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "player")]
#[command(about = "Synchronized playback participant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow play directives from the relay until interrupted [default]
    Run,

    /// Ask the relay to start every connected player together, then keep following
    Trigger,

    /// Print this installation's client identity
    Id,
}
