//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::aggregation::AggregationService;
use crate::api::routes;
use crate::error::Result;
use crate::logging::LoggingConfig;
use crate::media::MediaPipeline;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            enable_cors: true,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub aggregation: Arc<AggregationService>,
    pub pipeline: MediaPipeline,
    /// Logging configuration for dynamic log level changes
    pub logging_config: Option<Arc<LoggingConfig>>,
}

impl AppState {
    pub fn new(aggregation: Arc<AggregationService>, pipeline: MediaPipeline) -> Self {
        Self {
            start_time: Instant::now(),
            aggregation,
            pipeline,
            logging_config: None,
        }
    }

    /// Set the logging configuration.
    pub fn with_logging_config(mut self, config: Arc<LoggingConfig>) -> Self {
        self.logging_config = Some(config);
        self
    }
}

fn is_health_path(req: &Request) -> bool {
    req.uri().path().starts_with("/health")
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Shut the server down when `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        // Health probes are polled constantly; keep them out of the request log.
        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if is_health_path(req) {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_request(|req: &Request, span: &Span| {
                    if span.is_disabled() || is_health_path(req) {
                        return;
                    }
                    let mut on_request =
                        tower_http::trace::DefaultOnRequest::new().level(tracing::Level::INFO);
                    use tower_http::trace::OnRequest;
                    on_request.on_request(req, span);
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                )
                .on_failure(
                    |class: tower_http::classify::ServerErrorsFailureClass,
                     latency: Duration,
                     span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let mut on_failure =
                            tower_http::trace::DefaultOnFailure::new().level(tracing::Level::ERROR);
                        use tower_http::trace::OnFailure;
                        on_failure.on_failure(class, latency, span);
                    },
                ),
        )
    }

    /// Serve until the cancel token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| crate::error::Error::ApiError(format!("Invalid address: {}", e)))?;

        let router = self.router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| crate::error::Error::ApiError(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| crate::error::Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cache::{CacheTtls, ResultCache};
    use crate::credentials::KeyRotationPool;
    use crate::database::repositories::{EmptyCatalog, MemoryCacheRepository};
    use crate::media::PipelineConfig;
    use crate::presence::BroadcastPresence;
    use crate::providers::{AudioCatalogClient, PooledProvider, VideoSearchClient};

    /// State with no provider credentials, an in-memory cache and the given
    /// pipeline configuration.
    pub(crate) fn state_with_pipeline(config: PipelineConfig) -> AppState {
        let http = reqwest::Client::new();
        let pool = Arc::new(KeyRotationPool::new(Vec::new()));
        let timeout = Duration::from_secs(1);
        let video = PooledProvider::new(
            Arc::new(VideoSearchClient::new(
                http.clone(),
                "http://127.0.0.1:9",
                "http://localhost",
            )),
            pool.clone(),
            timeout,
        );
        let audio = PooledProvider::new(
            Arc::new(AudioCatalogClient::new(http, "http://127.0.0.1:9")),
            pool,
            timeout,
        );
        let cache = ResultCache::new(Arc::new(MemoryCacheRepository::new()), CacheTtls::default());
        let aggregation = AggregationService::new(video, audio, Arc::new(EmptyCatalog), cache);
        let pipeline = MediaPipeline::new(config, Arc::new(BroadcastPresence::default()));
        AppState::new(Arc::new(aggregation), pipeline)
    }

    pub(crate) fn state() -> AppState {
        state_with_pipeline(PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert!(config.enable_cors);
    }

    #[test]
    fn test_server_creation() {
        let token = CancellationToken::new();
        let server = ApiServer::new(ApiServerConfig::default(), test_support::state())
            .with_cancel_token(token.clone());

        assert!(!server.cancel_token().is_cancelled());
        server.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let config = ApiServerConfig {
            bind_address: "not an address".to_string(),
            ..ApiServerConfig::default()
        };
        let server = ApiServer::new(config, test_support::state());
        assert!(server.run().await.is_err());
    }
}
