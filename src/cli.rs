//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// OAuth2/OIDC authorization-code portal with a JWT-verifying resource API
#[derive(Parser, Debug)]
#[command(name = "entra-portal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "ENTRA_PORTAL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "ENTRA_PORTAL_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "ENTRA_PORTAL_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to running both services)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the portal and the resource API together (default)
    Serve,

    /// Run only the front-end portal
    Portal,

    /// Run only the resource API
    Resource,
}
