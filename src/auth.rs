use std::collections::HashMap;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde_json::json;

use crate::models::CallerIdentity;

/// Resolves the bearer token to the caller it was issued to.
pub fn authenticate(
    headers: &HeaderMap,
    tokens: &HashMap<String, String>,
) -> Result<CallerIdentity, (StatusCode, Json<serde_json::Value>)> {
    let token = extract_bearer_token(headers)?;

    match tokens.get(token.trim()) {
        Some(user_id) => Ok(CallerIdentity {
            user_id: user_id.clone(),
        }),
        None => Err(unauthorized("Invalid API token")),
    }
}

pub fn extract_bearer_token(
    headers: &HeaderMap,
) -> Result<String, (StatusCode, Json<serde_json::Value>)> {
    let Some(raw_header) = headers.get(AUTHORIZATION) else {
        return Err(unauthorized("Missing Authorization header"));
    };

    let Ok(value) = raw_header.to_str() else {
        return Err(unauthorized("Invalid Authorization header"));
    };

    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(unauthorized("Authorization must use Bearer token"));
    };

    Ok(token.to_string())
}

fn unauthorized(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": message
            }
        })),
    )
}
