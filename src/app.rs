//! `App`: load configuration, build [`AppState`], bind, and serve --
//! construction is split from the listen loop so tests can build an
//! `AppState` without binding a socket.

use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::Context;
use tracing::info;

use crate::cli::Args;
use crate::state::AppState;
use crate::web::create_router;

pub struct App {
    state: AppState,
}

impl App {
    pub fn new(args: &Args) -> Result<Self, anyhow::Error> {
        let mut config = crate::config::load(args.config.as_deref()).context("failed to load configuration")?;

        if let Some(port) = args.port {
            config.bind_addr = override_port(&config.bind_addr, port);
        }

        let state = AppState::new(config).context("failed to construct application state")?;
        Ok(Self { state })
    }

    pub async fn run(self) -> ExitCode {
        let bind_addr: SocketAddr = match self.state.config.bind_addr.parse() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(error = %e, addr = %self.state.config.bind_addr, "invalid bindAddr");
                return ExitCode::FAILURE;
            }
        };

        let shutdown_timeout = self.state.config.shutdown_timeout;
        let router = create_router(self.state);

        let listener = match tokio::net::TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, addr = %bind_addr, "failed to bind listener");
                return ExitCode::FAILURE;
            }
        };

        info!(addr = %bind_addr, "aussie-gateway listening");

        let serve = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal());

        tokio::select! {
            result = serve => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "server error");
                    return ExitCode::FAILURE;
                }
            }
            _ = tokio::time::sleep(shutdown_timeout + std::time::Duration::from_secs(5)) => {
                tracing::warn!("graceful shutdown exceeded its timeout, forcing exit");
            }
        }

        ExitCode::SUCCESS
    }
}

fn override_port(bind_addr: &str, port: u16) -> String {
    match bind_addr.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind_addr}:{port}"),
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
