//! Logging API routes.
//!
//! Read and replace the live tracing filter directive.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::logging::{LogModule, available_modules};

/// Request to update the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

/// Response for logging configuration.
#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub available_modules: Vec<LogModule>,
}

/// Create the logging router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

async fn get_logging_config(
    State(state): State<AppState>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
        available_modules: available_modules(),
    }))
}

async fn update_logging_config(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;

    logging_config.set_filter(&request.filter)?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
        available_modules: available_modules(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::test_support;
    use crate::logging::{DEFAULT_LOG_FILTER, LoggingConfig};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = test_support::state().with_logging_config(Arc::new(LoggingConfig::detached()));
        Router::new()
            .nest("/api/logging", router())
            .with_state(state)
    }

    #[tokio::test]
    async fn test_get_filter() {
        let response = app()
            .oneshot(Request::builder().uri("/api/logging").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["filter"], DEFAULT_LOG_FILTER);
        assert!(!json["available_modules"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_invalid_filter_is_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/logging")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"filter":"tunestream=verbose"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_logging_config() {
        let app = Router::new()
            .nest("/api/logging", router())
            .with_state(test_support::state());

        let response = app
            .oneshot(Request::builder().uri("/api/logging").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
