//! HTTP API
//!
//! Routes, shared state and token authentication. All routes are mounted
//! under the configured base URL:
//!
//! - `POST {base}/aichat/chat` - generate a reply
//! - `GET {base}/aichat/models` - list model identifiers
//! - `GET {base}/aichat/models/profile` - family, parameters and memory for a model
//! - `GET {base}/aichat/suggestions` - follow-up prompt suggestions

pub mod error;
pub mod handlers;

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::inference::Inference;
use crate::research::WebSearch;
use crate::storage::settings::ServerConfig;

pub use error::ApiError;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub inference: Arc<dyn Inference>,
    pub search: Arc<dyn WebSearch>,
}

impl AppState {
    pub fn new(config: ServerConfig, inference: Arc<dyn Inference>, search: Arc<dyn WebSearch>) -> Self {
        Self {
            config: Arc::new(config),
            inference,
            search,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route(&config.route("/aichat/chat"), post(handlers::chat))
        .route(&config.route("/aichat/models"), get(handlers::list_models))
        .route(&config.route("/aichat/models/profile"), get(handlers::model_profile))
        .route(&config.route("/aichat/suggestions"), get(handlers::suggestions))
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject requests without the configured token. Open when no token is set.
async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.token.as_deref() else {
        return next.run(request).await;
    };

    if presented_token(&request).as_deref() == Some(expected) {
        next.run(request).await
    } else {
        tracing::warn!("Rejected unauthenticated request to {}", request.uri().path());
        ApiError::Forbidden("Invalid or missing token".to_string()).into_response()
    }
}

/// Token from `Authorization: token <t>`, `Authorization: Bearer <t>` or `?token=<t>`
fn presented_token(request: &Request) -> Option<String> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("token ").or_else(|| v.strip_prefix("Bearer ")))
        .map(|t| t.trim().to_string());

    header.or_else(|| {
        Query::<HashMap<String, String>>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(mut params)| params.remove("token"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_presented_token_sources() {
        assert_eq!(presented_token(&request("/", Some("token abc"))).as_deref(), Some("abc"));
        assert_eq!(presented_token(&request("/", Some("Bearer xyz"))).as_deref(), Some("xyz"));
        assert_eq!(presented_token(&request("/?token=q1", None)).as_deref(), Some("q1"));
        assert_eq!(presented_token(&request("/", Some("Basic abc"))), None);
        assert_eq!(presented_token(&request("/", None)), None);
    }
}
