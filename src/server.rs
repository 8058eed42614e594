use std::sync::Arc;

use axum::{
    Json,
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    data_dir::DataDir,
    error::{self, Error},
    normalize::TextNormalizer,
    search::{QueryCoordinator, QueryResult},
    settings::Settings,
};

/// Shared, read-only state behind every request.
pub struct AppState {
    normalizer: Arc<TextNormalizer>,
    coordinator: QueryCoordinator,
    dense_top_k: usize,
    sparse_top_k: usize,
}

impl AppState {
    pub fn new(
        normalizer: Arc<TextNormalizer>,
        coordinator: QueryCoordinator,
        dense_top_k: usize,
        sparse_top_k: usize,
    ) -> Self {
        Self {
            normalizer,
            coordinator,
            dense_top_k,
            sparse_top_k,
        }
    }

    /// Wire up the query side from settings: normalizer, fitted vocabulary,
    /// embedder and vector store.
    pub fn from_settings(settings: &Settings, data_dir: &DataDir) -> error::Result<Self> {
        let normalizer = Arc::new(settings.build_normalizer(data_dir)?);
        let coordinator = QueryCoordinator::from_settings(settings, data_dir, normalizer.clone())?;
        Ok(Self::new(
            normalizer,
            coordinator,
            settings.query.similarity_top_k,
            settings.query.sparse_top_k,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub tokens: Vec<String>,
}

/// Every failure is reported as `400 {"error": ...}`.
#[derive(Debug)]
pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": self.0 }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection.body_text())
    }
}

/// Extract a non-blank `text` field from the request body.
fn required_text(payload: Result<Json<TextRequest>, JsonRejection>) -> Result<String, ApiError> {
    let Json(request) = payload?;
    match request.text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(Error::Validation("`text` must be a non-empty string".into()).into()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(format!("request worker failed: {e}")))?
        .map_err(ApiError::from)
}

async fn process(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let text = required_text(payload)?;
    let tokens = blocking(move || Ok(state.normalizer.normalize(&text))).await?;
    Ok(Json(ProcessResponse { tokens }))
}

async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<Vec<QueryResult>>, ApiError> {
    let text = required_text(payload)?;
    let results = blocking(move || {
        state
            .coordinator
            .query(&text, state.dense_top_k, state.sparse_top_k)
    })
    .await?;
    Ok(Json(results))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/rag/process", post(process))
        .route("/api/rag/query", post(query))
        .with_state(state)
}

/// Serve the HTTP API on `bind` until Ctrl-C.
pub fn run_server(state: AppState, bind: &str) -> error::Result<()> {
    let app = router(Arc::new(state));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("failed to start tokio runtime: {e}")))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(bind).await?;
        tracing::info!(address = %listener.local_addr()?, "listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "failed to listen for shutdown signal");
                }
            })
            .await?;
        tracing::info!("server stopped");
        Ok(())
    })
}
