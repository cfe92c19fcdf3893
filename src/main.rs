//! imgshelf server binary.
//!
//! Serves the home and admin pages, raw uploads and other static files, and a
//! small JSON API for uploading, listing and deleting images whose metadata is
//! kept in a single JSON file.

mod atomic;
mod config;
mod crawler;
mod error;
mod http;
mod images;
mod logging;
mod pages;
mod store;

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::routing::{delete, get};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span, warn};

use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::pages::SiteConfig;
use crate::store::{ImageStore, UPLOADS_URL_PREFIX};

/// 启动服务，收到终止信号后在宽限期内优雅退出。
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let store = Arc::new(args.image_store());
    store.ensure_dirs().await?;
    info!(
        uploads = ?store.uploads_dir(),
        staging = ?store.staging_dir(),
        "storage ready"
    );
    let site = Arc::new(args.site_config());
    let app = build_app(store, site);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("Server is running on port {}", args.port);
    info!("Main page: http://localhost:{}", args.port);
    info!("Admin page: http://localhost:{}/admin31", args.port);

    let shutdown = handle.clone();
    tokio::spawn(async move {
        let name = termination_signal().await;
        info!(signal = name, grace_secs = SHUTDOWN_GRACE_SECS, "shutting down");
        shutdown.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
    });

    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    info!("server stopped");
    Ok(())
}

fn build_app(store: Arc<ImageStore>, site: Arc<SiteConfig>) -> Router {
    Router::new()
        .route("/", get(pages::home_page))
        .route("/admin31", get(pages::admin_page))
        .route("/robots.txt", get(pages::robots_txt))
        .route(
            "/api/images",
            get(images::list_images)
                .post(images::upload_image)
                .delete(images::delete_all_images)
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/api/images/{filename}", delete(images::delete_image))
        .nest_service(UPLOADS_URL_PREFIX, site.uploads_service())
        .fallback_service(site.public_service())
        .layer(middleware::from_fn(crawler::detect_crawler))
        .layer(middleware::from_fn(crate::http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = %crate::http::client_addr(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(store))
        .layer(Extension(site))
}

/// 等待 Ctrl+C 或 SIGTERM，返回收到的信号名。
///
/// 某个信号监听安装失败时只记录警告，继续等待另一个。
async fn termination_signal() -> &'static str {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "ctrl_c",
            Err(err) => {
                warn!(error = %err, "ctrl_c listener unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "sigterm"
            }
            Err(err) => {
                warn!(error = %err, "sigterm listener unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
