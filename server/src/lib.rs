//! Library entry for the `securevault_server` crate.
//!
//! Exposes `inner_main` so the workspace-level shim binary can call into the server logic.
//!
//! Provides commands to run the HTTP API and the few operator tasks around it
//! (schema migration, vector index creation, owner bootstrap).

extern crate alloc;
extern crate core;

pub mod app;
pub mod cli;
pub mod clients;
pub mod config;
pub mod http;
pub mod ingest;

use std::{io, process, sync::Once};

use clap::Parser as _;
use eyre::Result;
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat};

static INIT_TRACING: Once = Once::new();
static INIT_RUSTLS: Once = Once::new();

/// Installs the process-wide rustls crypto provider used by all outbound HTTP clients.
///
/// Safe to call repeatedly; only the first call has an effect.
pub fn install_crypto_provider() {
    INIT_RUSTLS.call_once(|| {
        // Err means some other provider won the race, which is just as good.
        drop(rustls_openssl::default_provider().install_default());
    });
}

/// Sets up the global tracing subscriber.
///
/// Events are written straight to stdout without an intermediate buffer so that
/// a supervisor sees them in the order they happened.
fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_timer(ChronoLocal::rfc_3339())
            .with_writer(io::stdout);

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The server's main function; called from the shim binary.
///
/// Loads a `.env` file when present, parses the CLI and dispatches.
///
/// # Errors
///
/// Returns an error if the selected command fails, e.g. when the configuration is
/// incomplete or the listener cannot be bound.
pub async fn inner_main() -> Result<()> {
    // No .env file is the normal case outside local development.
    drop(dotenvy::dotenv());
    run(Cli::parse()).await
}

/// Dispatches an already parsed invocation.
///
/// # Errors
///
/// See [`inner_main`].
pub async fn run(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::Serve(args) => {
            init_tracing(args.common.log_format);
            install_crypto_provider();

            let startup_span = tracing::info_span!(
                "vault.startup",
                config_path = ?args.common.config,
                pid = ?process::id(),
                version = env!("CARGO_PKG_VERSION")
            );

            async {
                info!("Starting securevault");
                app::start(&args).await
            }
            .instrument(startup_span)
            .await
        }
        Command::Migrate(args) => {
            init_tracing(args.log_format);
            app::migrate(&args.config).await
        }
        Command::EnsureIndex(args) => {
            init_tracing(args.log_format);
            install_crypto_provider();
            app::ensure_index(&args.config).await
        }
        Command::GrantOwner(args) => {
            init_tracing(args.common.log_format);
            app::grant_owner(&args).await
        }
    }
}
