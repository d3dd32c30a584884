//! CLI Module
//!
//! Command-line interface for the gridsync layout engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gridsync - dashboard layout state engine
#[derive(Parser, Debug)]
#[command(name = "gridsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the storage directory
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the saved layout
    #[command(name = "show")]
    Show {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Add a widget to the saved layout
    #[command(name = "add")]
    Add {
        /// Unique widget id
        id: String,

        /// Component name to render
        component: String,

        #[arg(short, default_value_t = 0)]
        x: u32,

        #[arg(short, default_value_t = 0)]
        y: u32,

        #[arg(short, default_value_t = 4)]
        w: u32,

        #[arg(long = "height", default_value_t = 2)]
        h: u32,

        /// Component props as a JSON object
        #[arg(long)]
        props: Option<String>,

        /// Pin the widget in place
        #[arg(long)]
        pinned: bool,
    },

    /// Remove a widget from the saved layout
    #[command(name = "remove")]
    Remove {
        /// Widget id
        id: String,
    },

    /// Move, resize or re-type a widget
    #[command(name = "update")]
    Update {
        /// Widget id
        id: String,

        #[arg(short)]
        x: Option<u32>,

        #[arg(short)]
        y: Option<u32>,

        #[arg(short)]
        w: Option<u32>,

        #[arg(long = "height")]
        h: Option<u32>,

        #[arg(long)]
        component: Option<String>,
    },

    /// Import the legacy fallback record into durable storage
    #[command(name = "migrate")]
    Migrate,

    /// List durable layout records
    #[command(name = "records")]
    Records {
        /// Only records saved at or after this time (RFC 3339 or epoch millis)
        #[arg(long)]
        since: Option<String>,

        /// Delete every durable record instead of listing
        #[arg(long, conflicts_with = "since")]
        clear: bool,
    },

    /// Push the saved layout to the server over HTTP
    #[command(name = "push")]
    Push,

    /// Keep the saved layout in live sync with the server
    #[command(name = "watch")]
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Interactive editing session
    #[command(name = "shell")]
    Shell,
}
