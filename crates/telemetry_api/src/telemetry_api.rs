use crate::http::{build_router, run_http_server, AppState, HttpServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct TelemetryApi {
    state: AppState,
    config: HttpServerConfig,
}

impl TelemetryApi {
    pub fn new(state: AppState, config: HttpServerConfig) -> Self {
        debug!("Initializing telemetry API module");
        Self { state, config }
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| {
            Box::pin(async move {
                run_http_server(self.config, build_router(self.state), ctx).await
            })
        }
    }
}
