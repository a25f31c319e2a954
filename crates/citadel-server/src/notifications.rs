use axum::{extract::State, Extension, Json};

use citadel_types::api::{Claims, NotificationListResponse, OutcomeResponse};

use crate::auth::AppState;
use crate::outcome::{reject, Rejection};

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationListResponse>, Rejection> {
    let notifications = state.graph.notifications(&claims.sub).await.map_err(reject)?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    Ok(Json(NotificationListResponse {
        notifications,
        unread,
    }))
}

pub async fn unread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let unread = state.graph.unread_count(&claims.sub).await.map_err(reject)?;
    Ok(Json(serde_json::json!({ "unread": unread })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OutcomeResponse>, Rejection> {
    state.graph.mark_all_read(&claims.sub).await.map_err(reject)?;
    Ok(Json(OutcomeResponse::ok()))
}
