use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let dirty = state.service.is_dirty();
    let stats = state.service.stats();
    let status = if dirty {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = json!({
        "ok": !dirty,
        "users": stats.users,
        "directReferrals": stats.direct_referrals,
        "indirectReferrals": stats.indirect_referrals,
        "snapshot": if dirty { "dirty" } else { "clean" },
    });
    (status, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

pub async fn user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.user(&id) {
        Some(user) => (StatusCode::OK, Json(json!(user))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "user_not_found" })),
        ),
    }
}
