use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::monitoring::{ExpirySummary, MonitoringConfigUpdate};
use crate::services::monitoring_service;
use crate::state::AppState;

pub async fn email_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.email.status(), "error": null }))
}

pub async fn email_test(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let report = state.email.send_test_email().await?;
    Ok(Json(json!({ "data": report, "error": null })))
}

pub async fn email_verify(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let report = state.email.verify_connection().await?;
    Ok(Json(json!({ "data": report, "error": null })))
}

pub async fn monitoring_status(State(state): State<AppState>) -> Json<Value> {
    let status = monitoring_service::status(&state).await;
    Json(json!({ "data": status, "error": null }))
}

async fn ensure_enabled(state: &AppState) -> Result<(), AppError> {
    if !state.monitor.settings().await.enabled {
        return Err(AppError::BadRequest(
            "Certificate monitoring is disabled".into(),
        ));
    }
    Ok(())
}

/// Run a check now, mailing the result when e-mail is enabled.
pub async fn monitoring_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    ensure_enabled(&state).await?;
    let summary = monitoring_service::check_certificates(&state).await?;
    Ok(Json(json!({
        "data": {
            "message": "Certificate check completed",
            "summary": summary,
        },
        "error": null
    })))
}

pub async fn monitoring_start(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let started = monitoring_service::start(&state).await?;
    let message = if started {
        "Certificate monitoring started"
    } else {
        "Certificate monitoring is already running"
    };
    Ok(Json(json!({ "data": { "message": message }, "error": null })))
}

pub async fn monitoring_stop(State(state): State<AppState>) -> Json<Value> {
    let stopped = monitoring_service::stop(&state).await;
    let message = if stopped {
        "Certificate monitoring stopped"
    } else {
        "Certificate monitoring was not running"
    };
    Json(json!({ "data": { "message": message }, "error": null }))
}

/// Same scan as a check, without recording it or sending mail.
pub async fn monitoring_expiring(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let expiring = monitoring_service::find_expiring(&state).await?;
    Ok(Json(json!({
        "data": ExpirySummary::new(expiring),
        "error": null
    })))
}

pub async fn monitoring_config(
    State(state): State<AppState>,
    Json(update): Json<MonitoringConfigUpdate>,
) -> Result<Json<Value>, AppError> {
    let settings = monitoring_service::update_settings(&state, update).await?;
    Ok(Json(json!({
        "data": {
            "message": "Monitoring configuration updated",
            "settings": settings,
        },
        "error": null
    })))
}
