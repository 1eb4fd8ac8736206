// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for replybook

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "replybook")]
#[command(about = "A trigger-based reply engine backed by hot-reloading word lists")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer triggers read line by line from stdin until EOF or Ctrl-C
    Serve {
        #[arg(short, long, help = "Word list directory (overrides config)")]
        dir: Option<PathBuf>,

        #[arg(long, help = "Sender id reported to templates", default_value = "console")]
        sender: String,

        #[arg(long, help = "Group id reported to templates", default_value = "")]
        group: String,

        #[arg(long, help = "Prefix replies with their source file and line")]
        show_source: bool,
    },

    /// Look up a single trigger and print the replies
    Query {
        #[arg(help = "Trigger text to look up")]
        trigger: String,

        #[arg(short, long, help = "Word list directory (overrides config)")]
        dir: Option<PathBuf>,

        #[arg(long, help = "Print replies as JSON")]
        json: bool,
    },

    /// Load every word list and report entry counts and parse problems
    Check {
        #[arg(short, long, help = "Word list directory (overrides config)")]
        dir: Option<PathBuf>,

        #[arg(long, help = "Print per-file summaries as JSON")]
        json: bool,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
