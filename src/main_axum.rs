use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handlers::handlers::{
    cors, get_comments, get_danmaku, like, list_all, list_category, log_requests, post_comment,
    post_danmaku, search, set_file_name, set_title, stream_video, top20, unlike,
};
use crate::service::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos", get(list_all))
        .route("/api/videos/all", get(list_all))
        .route("/api/videos/top20", get(top20))
        // The segment is a category here and a video id below.
        .route("/api/videos/{id}", get(list_category))
        .route("/api/videos/{id}/like", post(like))
        .route("/api/videos/{id}/unlike", post(unlike))
        .route("/api/videos/{id}/title", post(set_title))
        .route("/api/videos/{id}/file_name", post(set_file_name))
        .route("/api/videos/{id}/comment", get(get_comments).post(post_comment))
        .route("/api/search", get(search))
        .route("/api/danmaku", get(get_danmaku).post(post_danmaku))
        .route("/{category}/{filename}", get(stream_video))
        .layer(middleware::from_fn(cors))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Binds `address` and serves in the background. Returns the bound address (useful with
/// port 0) and the server task.
pub async fn start_axum_server(
    config: ServerConfig,
    address: Option<String>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let addr_str = address.unwrap_or_else(|| config.bind_addr.clone());
    let state = AppState::new(config)?;
    let listener = TcpListener::bind(&addr_str)
        .await
        .with_context(|| format!("binding to {addr_str}"))?;
    let addr = listener.local_addr()?;
    info!("Starting server at http://{addr}");

    let app = build_router(state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server stopped: {e}");
        }
    });
    Ok((addr, handle))
}

/// Runs the catalogue server until the process is stopped.
pub async fn serve_forever(config: ServerConfig) -> Result<()> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr))?;
    info!(
        "Serving {} ({}) on http://{addr}",
        config.media_root.display(),
        config.categories.join(", ")
    );
    let state = AppState::new(config)?;

    axum_server::Server::bind(addr)
        .serve(build_router(state).into_make_service())
        .await
        .context("running server")?;
    Ok(())
}
