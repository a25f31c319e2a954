use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use jsonwebtoken::{encode, EncodingKey, Header};
use tracing::error;

use citadel_core::{AuthProvider, SocialError, SocialGraph};
use citadel_store::{SocialStore, StoreError};
use citadel_sync::SyncLayer;
use citadel_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};
use citadel_types::keys;

use crate::outcome::{bad_request, internal, reject, Rejection};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub graph: SocialGraph,
    pub sync: Arc<SyncLayer>,
    pub vault: CredentialVault,
    pub jwt_secret: String,
}

/// Argon2id credential storage in the `creds/<username>` key space. The
/// social graph never sees a password or a hash.
pub struct CredentialVault {
    store: Arc<dyn SocialStore>,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthProvider for CredentialVault {
    async fn enroll(&self, username: &str, password: &str) -> Result<(), SocialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StoreError::Backend(format!("password hashing failed: {e}")))?
            .to_string();

        self.store
            .set(
                &keys::creds_key(username),
                serde_json::json!({ "hash": hash }),
            )
            .await?;
        Ok(())
    }

    async fn verify(&self, username: &str, password: &str) -> Result<bool, SocialError> {
        let Some(value) = self.store.get(&keys::creds_key(username)).await? else {
            return Ok(false);
        };
        let Some(stored) = value.get("hash").and_then(|h| h.as_str()) else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(stored)
            .map_err(|e| StoreError::Backend(format!("stored hash unparsable: {e}")))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, Rejection> {
    if req.password.len() < 8 {
        return Err(bad_request("password must be at least 8 characters"));
    }

    let user = state
        .graph
        .create_user(&req.username, req.display_name.as_deref().unwrap_or(""))
        .await
        .map_err(reject)?;
    state
        .vault
        .enroll(&user.username, &req.password)
        .await
        .map_err(reject)?;

    let token = create_token(&state.jwt_secret, &user.username).map_err(|err| {
        error!("token creation failed for {}: {err}", user.username);
        internal()
    })?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: user.username,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let verified = state
        .vault
        .verify(&req.username, &req.password)
        .await
        .map_err(reject)?;
    if !verified {
        return Err(reject(SocialError::BadCredentials));
    }

    let user = state.graph.user(&req.username).await.map_err(reject)?;
    let token = create_token(&state.jwt_secret, &user.username).map_err(|err| {
        error!("token creation failed for {}: {err}", user.username);
        internal()
    })?;

    Ok(Json(LoginResponse {
        username: user.username,
        display_name: user.display_name,
        token,
    }))
}

pub fn create_token(secret: &str, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
