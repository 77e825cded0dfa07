//! Command-line interface for filedock.

mod commands;

use clap::{Parser, Subcommand};

/// filedock - self-hosted file sharing with moderated public listings
#[derive(Parser)]
#[command(name = "filedock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server and background jobs (default)
    #[command(alias = "daemon")]
    Serve,

    /// Load and validate configuration, then print the effective settings
    #[command(alias = "check")]
    CheckConfig,

    /// Create a verified administrator (password from ADMIN_PASSWORD)
    CreateAdmin {
        username: String,
        email: String,
    },
}

pub use commands::*;
