//! filedrop server binary.
//!
//! Accepts multipart uploads, stores them under date-bucketed directories and
//! serves them back over a static route. Uploads can be gated behind a JWT
//! issued by `/login`.

mod app;
mod atomic;
mod auth;
mod config;
mod envelope;
mod error;
mod http;
mod logging;
mod storage;
mod tls;
mod upload;

use axum::Router;
use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::app::{AppState, build_router, log_routes};
use crate::config::Args;
use crate::http::build_cors_layer;
use crate::storage::Storage;

/// Starts the filedrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(args.assets_root()));
    storage.ensure_root().await?;

    let state = AppState {
        storage,
        upload: Arc::new(args.upload_config()?),
        auth: args.auth_config()?.map(Arc::new),
        envelope: args.envelope_field,
    };
    log_routes(&state);

    let mut cors_headers = vec![args.subdir_header.as_str()];
    if state.auth.is_some() {
        cors_headers.push(args.token_header.as_str());
    }
    let cors_layer = build_cors_layer(args.cors_origins.as_deref(), &cors_headers);

    let mut app = build_router(state);
    if let Some(cors_layer) = cors_layer {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));
    serve(app, addr, handle, &args).await
}

async fn serve(app: Router, addr: SocketAddr, handle: Handle, args: &Args) -> std::io::Result<()> {
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let (Some(cert), Some(key)) = (&args.tls_cert, &args.tls_key) {
        let tls_config = tls::build_rustls_config(cert, key).await?;
        info!("Listening and serving HTTPS on {}", addr);
        return axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(service)
            .await;
    }

    info!("Listening and serving HTTP on {}", addr);
    axum_server::bind(addr).handle(handle).serve(service).await
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
