use axum::http::StatusCode;
use axum::Json;
use citadel_core::SocialError;
use citadel_types::api::OutcomeResponse;
use tracing::error;

pub type Rejection = (StatusCode, Json<OutcomeResponse>);

/// Map a social-graph failure to a structured outcome. The UI branches on
/// this body, never on an exception.
pub fn reject(err: SocialError) -> Rejection {
    let status = match &err {
        SocialError::UnknownUser(_) | SocialError::NotFound(_) => StatusCode::NOT_FOUND,
        SocialError::UsernameTaken(_)
        | SocialError::AlreadyFriends(_)
        | SocialError::DuplicateRequest(_) => StatusCode::CONFLICT,
        SocialError::SelfReference | SocialError::InvalidUsername(_) => StatusCode::BAD_REQUEST,
        SocialError::BadCredentials => StatusCode::UNAUTHORIZED,
        SocialError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if !err.is_rejection() {
        error!("store failure surfaced to client: {err}");
    }
    (status, Json(OutcomeResponse::rejected(err.to_string())))
}

pub fn bad_request(message: &str) -> Rejection {
    (
        StatusCode::BAD_REQUEST,
        Json(OutcomeResponse::rejected(message)),
    )
}

pub fn internal() -> Rejection {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(OutcomeResponse::rejected("internal error")),
    )
}
