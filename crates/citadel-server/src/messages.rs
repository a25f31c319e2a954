use axum::{extract::Path, extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use uuid::Uuid;

use citadel_core::SocialError;
use citadel_types::api::{Claims, SendMessageRequest, ToggleReactionRequest};
use citadel_types::models::Message;

use crate::auth::AppState;
use crate::outcome::{bad_request, reject, Rejection};

pub async fn send_dm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(partner): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, Rejection> {
    if req.text.is_empty() {
        return Err(bad_request("message text must not be empty"));
    }
    let message = state
        .graph
        .send_direct(&claims.sub, &partner, &req.text)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn dm_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(partner): Path<String>,
) -> Result<Json<Vec<Message>>, Rejection> {
    let messages = state
        .graph
        .thread(&claims.sub, &partner)
        .await
        .map_err(reject)?;
    Ok(Json(messages))
}

pub async fn send_channel_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((bastion_id, channel_id)): Path<(String, String)>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, Rejection> {
    if req.text.is_empty() {
        return Err(bad_request("message text must not be empty"));
    }
    let message = state
        .graph
        .send_channel(&bastion_id, &channel_id, &claims.sub, &req.text)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn channel_messages(
    State(state): State<AppState>,
    Path((bastion_id, channel_id)): Path<(String, String)>,
) -> Result<Json<Vec<Message>>, Rejection> {
    let messages = state
        .graph
        .channel_messages(&bastion_id, &channel_id)
        .await
        .map_err(reject)?;
    Ok(Json(messages))
}

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((bastion_id, channel_id, message_id)): Path<(String, String, Uuid)>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let added = state
        .graph
        .toggle_reaction(&bastion_id, &channel_id, message_id, &req.emoji, &claims.sub)
        .await
        .map_err(reject)?
        .ok_or_else(|| reject(SocialError::NotFound(format!("message {message_id}"))))?;
    Ok(Json(serde_json::json!({ "added": added })))
}
