use async_trait::async_trait;
use citadel_store::Tx;
use citadel_types::keys;
use citadel_types::models::{User, UserStatus};
use tracing::info;

use crate::{SocialError, SocialGraph};

/// Credential verification seam. The core passes credentials through at
/// registration and login and never inspects or stores them itself; the
/// provider owns the `creds/<username>` key space.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn enroll(&self, username: &str, password: &str) -> Result<(), SocialError>;

    /// `Ok(true)` on a matching credential, `Ok(false)` on a mismatch or
    /// unknown username. Errors are reserved for store faults.
    async fn verify(&self, username: &str, password: &str) -> Result<bool, SocialError>;
}

#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub banner: Option<String>,
}

fn validate_username(username: &str) -> Result<String, SocialError> {
    let username = username.to_lowercase();
    let ok_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if username.len() < 3 || username.len() > 32 || !ok_chars {
        return Err(SocialError::InvalidUsername(username));
    }
    Ok(username)
}

impl SocialGraph {
    /// Create a fresh user record. The username becomes the immutable,
    /// lowercase primary key.
    pub async fn create_user(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<User, SocialError> {
        let username = validate_username(username)?;
        let display_name = if display_name.is_empty() {
            username.clone()
        } else {
            display_name.to_string()
        };

        let user = User::new(&username, &display_name);
        let fresh = serde_json::to_value(&user).map_err(citadel_store::StoreError::from)?;

        // Transactional create-if-absent, so two racing registrations of the
        // same name cannot both win.
        let committed = self
            .store()
            .transaction(
                &keys::user_key(&username),
                Box::new(move |old| {
                    if old.is_some() {
                        Tx::Abort
                    } else {
                        Tx::Write(fresh.clone())
                    }
                }),
            )
            .await?;

        if committed.is_none() {
            return Err(SocialError::UsernameTaken(username));
        }

        info!("created user {username}");
        Ok(user)
    }

    pub async fn user(&self, username: &str) -> Result<User, SocialError> {
        self.read_user(username).await
    }

    pub async fn set_status(
        &self,
        username: &str,
        status: UserStatus,
    ) -> Result<(), SocialError> {
        self.mutate_user(username, move |user| user.status = status)
            .await?
            .ok_or_else(|| SocialError::UnknownUser(username.to_lowercase()))?;
        Ok(())
    }

    pub async fn update_profile(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> Result<User, SocialError> {
        self.mutate_user(username, move |user| {
            if let Some(name) = &update.display_name {
                user.display_name = name.clone();
            }
            if let Some(avatar) = &update.avatar {
                user.avatar = Some(avatar.clone());
            }
            if let Some(banner) = &update.banner {
                user.banner = Some(banner.clone());
            }
        })
        .await?
        .ok_or_else(|| SocialError::UnknownUser(username.to_lowercase()))
    }
}
