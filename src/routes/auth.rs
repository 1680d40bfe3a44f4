use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::{credentials_match, expired_session_cookie, session_cookie, session_token};
use crate::error::AppError;
use crate::models::auth::{AuthStatus, LoginRequest};
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let auth = &state.config.auth;
    if !auth.enabled {
        return Err(AppError::BadRequest("Authentication is disabled".into()));
    }

    let (Some(username), Some(password)) = (
        req.username.filter(|u| !u.is_empty()),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Username and password are required".into(),
        ));
    };

    if !credentials_match(&username, &password, &auth.username, &auth.password) {
        tracing::warn!(username = %username, "Failed login attempt");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = state.sessions.create(&username);
    tracing::info!(username = %username, "User logged in");

    Ok((
        [(header::SET_COOKIE, session_cookie(&token, state.sessions.ttl_secs()))],
        Json(json!({
            "data": {
                "username": username,
                "expires_in": state.sessions.ttl_secs(),
            },
            "error": null
        })),
    ))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        if let Some(session) = state.sessions.get(&token) {
            tracing::info!(username = %session.username, "User logged out");
        }
        state.sessions.destroy(&token);
    }

    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(json!({ "data": { "message": "Logged out" }, "error": null })),
    )
}

pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let auth_enabled = state.config.auth.enabled;
    let session = session_token(&headers).and_then(|token| state.sessions.get(&token));

    let status = AuthStatus {
        authenticated: !auth_enabled || session.is_some(),
        username: session.map(|s| s.username),
        auth_enabled,
    };
    Json(json!({ "data": status, "error": null }))
}

pub async fn methods() -> Json<Value> {
    Json(json!({
        "data": {
            "basic": true,
            "oidc": { "enabled": false },
        },
        "error": null
    }))
}
