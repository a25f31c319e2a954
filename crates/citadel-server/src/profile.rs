use axum::{extract::State, Extension, Json};

use citadel_core::ProfileUpdate;
use citadel_types::api::{Claims, OutcomeResponse, ProfileRequest, StatusRequest};
use citadel_types::models::User;

use crate::auth::AppState;
use crate::outcome::{reject, Rejection};

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, Rejection> {
    let user = state.graph.user(&claims.sub).await.map_err(reject)?;
    Ok(Json(user))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<User>, Rejection> {
    let user = state
        .graph
        .update_profile(
            &claims.sub,
            ProfileUpdate {
                display_name: req.display_name,
                avatar: req.avatar,
                banner: req.banner,
            },
        )
        .await
        .map_err(reject)?;
    Ok(Json(user))
}

pub async fn set_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OutcomeResponse>, Rejection> {
    state
        .graph
        .set_status(&claims.sub, req.status)
        .await
        .map_err(reject)?;
    Ok(Json(OutcomeResponse::ok()))
}
