use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{extract::Request, middleware};
use tokio::{net::TcpListener, sync::Notify};
use tower_http::trace::{DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use libs::{search_settings::SharedSettings, util};

use tourist::{
    album::AlbumSync,
    api,
    common::{AppState, metrics},
    config::Config,
    db::LocalStore,
    flickr::FlickrClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("LOG_LEVEL"))
        .init();

    let config = Config::from_env().context("reading TOURIST_* configuration")?;
    tracing::debug!(data_dir = %config.data_dir, "configuration loaded");

    let settings = SharedSettings::load(&config.search_settings_file)
        .with_context(|| format!("loading {}", config.search_settings_file))?;
    let store = Arc::new(LocalStore::open(Path::new(&config.db_file)).await?);
    let client = FlickrClient::new(
        config.flickr_api_url.clone(),
        config.flickr_api_key.clone(),
        Duration::from_secs(config.http_timeout_secs),
        settings.clone(),
    )?;
    let sync = Arc::new(AlbumSync::new(store.clone(), Arc::new(client)));
    let state = AppState { sync, settings };

    let api_router = api::router(state)
        .route_layer(middleware::from_fn(metrics::track_http))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        uri = %req.uri(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::WARN)),
        );
    let metrics_router = metrics::prometheus_router()?;

    let shutdown_notify = Arc::new(Notify::new());
    tokio::spawn(util::listen_for_shutdown(shutdown_notify.clone()));

    let api_listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let metrics_listener = TcpListener::bind(format!("0.0.0.0:{}", config.metrics_port)).await?;

    tracing::info!("⇢ API listening on: http://{}", api_listener.local_addr()?);
    tracing::info!(
        "⇢ Metrics listening on: http://{}/metrics",
        metrics_listener.local_addr()?
    );

    let api_server = axum::serve(api_listener, api_router).with_graceful_shutdown({
        let n = shutdown_notify.clone();
        async move { n.notified().await }
    });
    let metrics_server = axum::serve(metrics_listener, metrics_router).with_graceful_shutdown({
        let n = shutdown_notify.clone();
        async move { n.notified().await }
    });

    tokio::try_join!(api_server, metrics_server)?;

    store.close().await?;
    tracing::info!("store closed, bye");
    Ok(())
}
