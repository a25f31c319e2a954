use serde::{Deserialize, Serialize};

use crate::models::{Notification, UserStatus};

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the WebSocket gateway.
/// Canonical definition lives here in citadel-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub display_name: String,
    pub token: String,
}

// -- Friends --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FriendRequestBody {
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct FriendListResponse {
    pub friends: Vec<String>,
    pub requests_sent: Vec<String>,
    pub requests_received: Vec<String>,
}

// -- Presence / profile --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileRequest {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub banner: Option<String>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

// -- Outcomes --

/// Rejected operations surface as a structured outcome, never a bare fault.
#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutcomeResponse {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
        }
    }
}
