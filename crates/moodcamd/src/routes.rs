//! HTTP surface of the advice proxy.

use crate::gemini::{AdviceGenerator, GeminiError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use moodcam_core::advice::ADVICE_PATH;
use moodcam_core::{AdviceResponse, SymptomEntry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn AdviceGenerator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(ADVICE_PATH, post(advise))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn advise(
    State(state): State<AppState>,
    body: Result<Json<SymptomEntry>, JsonRejection>,
) -> (StatusCode, Json<AdviceResponse>) {
    let entry = match body {
        Ok(Json(entry)) => entry,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "rejected advice request");
            return (
                StatusCode::BAD_REQUEST,
                Json(AdviceResponse::failed(rejection.body_text())),
            );
        }
    };

    match state.generator.generate(&entry).await {
        Ok(advice) => {
            tracing::info!(id = entry.id, chars = advice.len(), "advice generated");
            (StatusCode::OK, Json(AdviceResponse::ok(advice)))
        }
        Err(e) => {
            let status = match e {
                GeminiError::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            };
            tracing::error!(id = entry.id, error = %e, status = status.as_u16(), "advice generation failed");
            (status, Json(AdviceResponse::failed(e.to_string())))
        }
    }
}
