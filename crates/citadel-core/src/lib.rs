//! The social-graph engine: identity and presence, the friend request
//! lifecycle, the notification center, and DM/channel messaging. Everything
//! is written once against the [`SocialStore`] trait; no code here depends on
//! a concrete backend.

pub mod error;
pub mod friends;
pub mod messaging;
pub mod notifications;
pub mod users;

use std::sync::Arc;

use citadel_store::{SocialStore, Tx};
use citadel_types::keys;
use citadel_types::models::User;

pub use error::SocialError;
pub use users::{AuthProvider, ProfileUpdate};

/// Handle to the social graph over some backend. Cheap to clone.
#[derive(Clone)]
pub struct SocialGraph {
    store: Arc<dyn SocialStore>,
}

impl SocialGraph {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn SocialStore> {
        self.store.clone()
    }

    /// Read a user record, mapping an absent key to `UnknownUser`.
    pub(crate) async fn read_user(&self, username: &str) -> Result<User, SocialError> {
        let value = self
            .store
            .get(&keys::user_key(username))
            .await?
            .ok_or_else(|| SocialError::UnknownUser(username.to_lowercase()))?;
        Ok(serde_json::from_value(value).map_err(citadel_store::StoreError::from)?)
    }

    /// Single-key CAS mutation of one user record. Returns the committed
    /// record, or `None` if the record does not exist. Multi-record
    /// operations sequence two of these: each record is individually
    /// consistent, the pair is best-effort under concurrent writers.
    pub(crate) async fn mutate_user<F>(
        &self,
        username: &str,
        mut f: F,
    ) -> Result<Option<User>, SocialError>
    where
        F: FnMut(&mut User) + Send + 'static,
    {
        let key = keys::user_key(username);
        let committed = self
            .store
            .transaction(
                &key,
                Box::new(move |old| {
                    let Some(value) = old else {
                        return Tx::Abort;
                    };
                    let Ok(mut user) = serde_json::from_value::<User>(value) else {
                        return Tx::Abort;
                    };
                    f(&mut user);
                    match serde_json::to_value(&user) {
                        Ok(value) => Tx::Write(value),
                        Err(_) => Tx::Abort,
                    }
                }),
            )
            .await?;

        match committed {
            Some(value) => {
                let user = serde_json::from_value(value).map_err(citadel_store::StoreError::from)?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }
}

/// Insert `name` if not already present. Relationship lists are ordered sets.
pub(crate) fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|entry| entry == name) {
        list.push(name.to_string());
    }
}

pub(crate) fn remove_entry(list: &mut Vec<String>, name: &str) {
    list.retain(|entry| entry != name);
}
