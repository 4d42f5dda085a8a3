//! Command-line interface definitions for the server.
//!
//! Every flag that matters in a container can also be set through the environment,
//! most importantly `PORT`, which has no default.

use core::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = "securevault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API.
    Serve(ServiceArgs),

    /// Create or upgrade the database schema, then exit.
    Migrate(CommonArgs),

    /// Create the vector index when it does not exist yet, then exit.
    EnsureIndex(CommonArgs),

    /// Make an existing user the owner of a project.
    GrantOwner(GrantOwnerArgs),
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

/// Arguments shared by all subcommands.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Path to the configuration file. A missing file means defaults plus environment.
    #[arg(
        short,
        long,
        env = "SECUREVAULT_CONFIG",
        default_value = "securevault.toml"
    )]
    pub config: PathBuf,

    /// Log output format.
    #[arg(long, env = "SECUREVAULT_LOG_FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,
}

/// Arguments for the serve command.
#[derive(Debug, Args)]
pub struct ServiceArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// TCP port to listen on.
    #[arg(long, env = "PORT")]
    pub port: u16,

    /// Optional override for the bind address (overrides bind in config)
    #[arg(long, env = "SECUREVAULT_BIND")]
    pub bind: Option<IpAddr>,

    /// Optional override for the per-request timeout in seconds.
    #[arg(long, env = "SECUREVAULT_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

/// Arguments for the grant-owner command.
#[derive(Debug, Args)]
pub struct GrantOwnerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long)]
    pub user_id: String,
    #[arg(long)]
    pub company_id: String,
    #[arg(long)]
    pub team_id: String,
    #[arg(long)]
    pub project_id: String,
}
