use axum::{extract::Path, extract::State, Extension, Json};

use citadel_types::api::{Claims, FriendListResponse, FriendRequestBody, OutcomeResponse};

use crate::auth::AppState;
use crate::outcome::{reject, Rejection};

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<FriendListResponse>, Rejection> {
    let user = state.graph.user(&claims.sub).await.map_err(reject)?;
    Ok(Json(FriendListResponse {
        friends: user.friends,
        requests_sent: user.requests_sent,
        requests_received: user.requests_received,
    }))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FriendRequestBody>,
) -> Result<Json<OutcomeResponse>, Rejection> {
    state
        .graph
        .send_request(&claims.sub, &req.to)
        .await
        .map_err(reject)?;
    Ok(Json(OutcomeResponse::ok()))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(from): Path<String>,
) -> Result<Json<OutcomeResponse>, Rejection> {
    state
        .graph
        .accept_request(&claims.sub, &from)
        .await
        .map_err(reject)?;
    Ok(Json(OutcomeResponse::ok()))
}

pub async fn decline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(from): Path<String>,
) -> Result<Json<OutcomeResponse>, Rejection> {
    state
        .graph
        .decline_request(&claims.sub, &from)
        .await
        .map_err(reject)?;
    Ok(Json(OutcomeResponse::ok()))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<Json<OutcomeResponse>, Rejection> {
    state
        .graph
        .remove_friend(&claims.sub, &username)
        .await
        .map_err(reject)?;
    Ok(Json(OutcomeResponse::ok()))
}
