use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{auth::authenticate, models::AnswerRequest, AppState};

const MAX_QUERY_CHARS: usize = 2000;

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

pub async fn answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AnswerRequest>,
) -> impl IntoResponse {
    let caller = match authenticate(&headers, &state.config.api_tokens) {
        Ok(caller) => caller,
        Err(err) => return err.into_response(),
    };

    if payload.query.chars().count() > MAX_QUERY_CHARS {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({
                "error": {
                    "code": "QUERY_TOO_LONG",
                    "message": format!("Query must be at most {MAX_QUERY_CHARS} characters.")
                }
            })),
        )
            .into_response();
    }

    let response = state
        .assistant
        .answer(payload.query.trim(), &caller.user_id)
        .await;
    Json(response).into_response()
}

pub async fn list_domains(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = authenticate(&headers, &state.config.api_tokens) {
        return err.into_response();
    }

    Json(json!({ "domains": state.assistant.domains() })).into_response()
}
