use crate::http::{ops_routes, telemetry_routes, AppState};
use axum::Router;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(ops_routes())
        .nest("/v1/telemetry", telemetry_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` until `ctx` is cancelled, then drain in-flight requests
pub async fn run_http_server(
    config: HttpServerConfig,
    router: Router,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            ctx.cancelled().await;
            info!("HTTP server shutting down");
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
