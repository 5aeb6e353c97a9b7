use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

mod cache;
mod coalesce;
mod config;
mod rest;
mod router;
mod types;
mod upstream;
mod ws_gateway;

use crate::coalesce::{FetchCoordinator, FetchError};
use crate::router::{RequestRouter, Route};
use crate::types::ResourceRequest;
use crate::upstream::UpstreamClient;

pub struct AppState {
    pub router: RequestRouter,
    pub coordinator: FetchCoordinator,
    pub upstream: Arc<dyn UpstreamClient>,
}

impl AppState {
    pub fn initialize(config: config::Config) -> Arc<Self> {
        let cache = cache::CacheStore::new(config.cache_capacity);
        let router = RequestRouter::new(
            &config.upstream_base_url,
            Duration::from_secs(config.cache_ttl_secs),
        );
        let upstream = Arc::new(upstream::HttpUpstreamClient::new(config.upstream_api_key));

        Arc::new(Self {
            router,
            coordinator: FetchCoordinator::new(cache),
            upstream,
        })
    }

    /// Shared fetch path for both transports: route the request, then resolve
    /// it through the coalescing coordinator against the upstream client.
    pub async fn resolve(&self, request: &ResourceRequest) -> Result<Value, FetchError> {
        let Route { key, ttl, url } = self.router.route(request);
        let upstream = self.upstream.clone();
        self.coordinator
            .resolve(&key, ttl, move || async move { upstream.fetch(&url).await })
            .await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::initialize(config);

    let app = Router::new()
        .route("/api/crypto/:id", get(rest::coin_snapshot))
        .route("/api/crypto/:id/market_chart", get(rest::market_chart))
        .route("/ws", get(ws_gateway::ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "server failed");
            e
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
