//! HTTP boundary for the question-answering service.
//!
//! One operation: `POST /query` takes `{question, target_ids}` and returns
//! `{answer, sources}`. Malformed requests (missing or empty question or
//! target_ids) and resolution failures are 400; any later stage failure is
//! 500. Error bodies carry the failing stage and a message, never stack
//! traces or internal paths.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer a question over the selected documents |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the browser-based file
//! picker and chat UI is a separate collaborator calling across origins.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::Answerer;
use crate::config::Config;
use crate::error::{AnswerError, Stage};
use crate::models::QueryRequest;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    answerer: Arc<Answerer>,
}

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config, answerer: Arc<Answerer>) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { answerer });

    println!("query server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error body: the failing stage plus a human-readable message.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(error: impl Into<String>, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        error: error.into(),
        message: message.into(),
    }
}

/// Map a pipeline failure to an HTTP response: resolution problems are the
/// client's fault (bad or empty target selection), everything later is ours.
fn answer_error_response(err: AnswerError) -> AppError {
    let status = match err.stage {
        Stage::Resolve => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    AppError {
        status,
        error: err.stage.to_string(),
        message: err.cause.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

/// Request body. Fields are optional so missing ones produce our 400 payload
/// instead of a deserialization rejection.
#[derive(Deserialize)]
struct QueryBody {
    question: Option<String>,
    target_ids: Option<Vec<String>>,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResponse>, AppError> {
    let question = body.question.unwrap_or_default();
    let target_ids = body.target_ids.unwrap_or_default();

    if question.trim().is_empty() {
        return Err(bad_request("resolve", "question must not be empty"));
    }
    if target_ids.is_empty() {
        return Err(bad_request("resolve", "target_ids must not be empty"));
    }

    let request = QueryRequest {
        question,
        target_ids,
    };
    let result = state
        .answerer
        .answer(&request)
        .await
        .map_err(answer_error_response)?;

    let sources = result
        .cited_chunks
        .iter()
        .map(|chunk| format!("{}#{}", chunk.source_name, chunk.sequence_index))
        .collect();

    Ok(Json(QueryResponse {
        answer: result.answer_text,
        sources,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn resolve_failures_map_to_400() {
        let err = AnswerError::new(Stage::Resolve, PipelineError::NoDocuments);
        let resp = answer_error_response(err);
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.error, "resolve");
    }

    #[test]
    fn later_stage_failures_map_to_500() {
        for stage in [
            Stage::Fetch,
            Stage::Extract,
            Stage::Chunk,
            Stage::Embed,
            Stage::Index,
            Stage::Retrieve,
            Stage::Generate,
        ] {
            let err = AnswerError::new(stage, PipelineError::RemoteCall("boom".into()));
            let resp = answer_error_response(err);
            assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(resp.error, stage.as_str());
        }
    }

    #[test]
    fn error_message_carries_the_cause() {
        let err = AnswerError::new(
            Stage::Extract,
            PipelineError::UnsupportedType("image/png".into()),
        );
        let resp = answer_error_response(err);
        assert!(resp.message.contains("image/png"));
    }
}
