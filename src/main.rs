//! AxoConsole server binary.
//!
//! Serves a single WebSocket endpoint through which authenticated operators
//! run console commands, query server status, and manage files under a
//! confined root directory. The embedded web UI is served for every other path.

mod auth;
mod background;
mod commands;
mod config;
mod console;
mod dispatch;
mod error;
mod files;
mod frontend;
mod host;
mod logging;
mod path_guard;
mod phrases;
mod response;
mod socket;
mod status;
mod storage;
mod tls;

use axum::Router;
use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::get;
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span, warn};

use crate::auth::{Account, LoginLimits, SessionRegistry};
use crate::background::spawn_background_tasks;
use crate::commands::CommandRegistry;
use crate::config::{Args, DEFAULT_ACCOUNT, DEFAULT_LOG_FILE, WS_PATH};
use crate::dispatch::{CommandContext, Dispatcher};
use crate::host::{ProcessHost, ServerHost};
use crate::phrases::Phrases;
use crate::socket::ConsoleState;
use crate::storage::Storage;

shadow!(build);

/// Starts the console server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let root = PathBuf::from(&args.root_dir);
    let storage = Arc::new(Storage::new(root.clone(), args.download_max_mb));
    storage.ensure_root()?;

    let phrases = match &args.phrases_file {
        Some(path) => Phrases::load(Path::new(path))?,
        None => Phrases::english(),
    };

    let accounts = if args.accounts.is_empty() {
        warn!("no accounts configured, falling back to the default admin account");
        vec![DEFAULT_ACCOUNT.parse::<Account>().map_err(|err| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
        })?]
    } else {
        args.accounts.clone()
    };
    let sessions = Arc::new(SessionRegistry::new(
        accounts,
        LoginLimits {
            max_attempts: args.login_max_attempts,
            window: Duration::from_secs(args.login_window_secs),
            lockout: Duration::from_secs(args.login_lockout_secs),
        },
    ));

    let log_file = args
        .log_file
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join(DEFAULT_LOG_FILE));
    let host: Arc<dyn ServerHost> = match &args.server_cmd {
        Some(command) => Arc::new(ProcessHost::spawn(command, &root, Some(log_file))?),
        None => {
            info!("no managed server command, console input is disabled");
            Arc::new(ProcessHost::detached(Some(log_file)))
        }
    };

    let registry = CommandRegistry::new(args.log_viewer_role);
    info!(commands = registry.len(), log_viewer = ?args.log_viewer_role, "command registry ready");
    let dispatcher = Dispatcher::new(
        registry,
        CommandContext {
            sessions: sessions.clone(),
            storage,
            host,
            phrases: Arc::new(phrases),
        },
    );
    let state = Arc::new(ConsoleState::new(dispatcher));
    console::spawn_log_broadcast(state.clone());
    spawn_background_tasks(sessions);

    let app = Router::new()
        .route(WS_PATH, get(socket::ws_handler))
        .fallback(frontend::serve_frontend)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(state));

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let tls_config = tls::build_rustls_config(&args, host).await?;
    let handle = Handle::new();
    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    info!(root = %root.display(), "serving files under root");
    let server = async {
        match tls_config {
            Some(config) => {
                info!("Starting console server at wss://{}{}", addr, WS_PATH);
                axum_server::bind_rustls(addr, config)
                    .handle(handle.clone())
                    .serve(service)
                    .await
            }
            None => {
                info!("Starting console server at ws://{}{}", addr, WS_PATH);
                axum_server::bind(addr)
                    .handle(handle.clone())
                    .serve(service)
                    .await
            }
        }
    };

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle.clone()) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
