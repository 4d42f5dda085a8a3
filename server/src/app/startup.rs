use core::net::{IpAddr, SocketAddr};

use tokio::signal;
use tracing::{info, warn};

use crate::{
    app::{AppState, state::initialize_state},
    cli::ServiceArgs,
    config::load,
    http::server::router::create_app,
};

/// Resolves once the process is asked to stop (Ctrl-C, or SIGTERM on unix).
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C");
            core::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                core::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Bind the listener and serve until a shutdown signal arrives.
async fn start_server(app_state: AppState, listen_ip: IpAddr, listen_port: u16) -> eyre::Result<()> {
    let app = create_app(app_state);

    let addr = SocketAddr::from((listen_ip, listen_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    let server = axum::serve(listener, app);
    tokio::select! {
        res = server => res?,
        () = shutdown_signal() => {
            info!("Received shutdown, shutting down");
        }
    }

    Ok(())
}

/// # Returns
///
/// `Ok(())` when the server runs until termination, or an error if binding or setup fails.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or is incomplete, the
/// database cannot be opened, or the listener cannot bind.
pub(crate) async fn start(args: &ServiceArgs) -> eyre::Result<()> {
    info!("Starting HTTP server...");

    let config_path = args.common.config.as_path();
    let mut config = load(config_path).await?;

    // Apply optional overrides from CLI/env
    if let Some(secs) = args.request_timeout_secs {
        config.server.request_timeout_secs = secs;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    let listen_ip = config.server.bind;
    info!(
        timeout_secs = config.server.request_timeout_secs,
        "Request timeout configured"
    );

    let app_state = initialize_state(config, config_path).await?;

    start_server(app_state, listen_ip, args.port).await
}
