use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's notification log keeps only the 50 most recent entries.
pub const NOTIFICATION_CAP: usize = 50;

/// The DM partner index keeps the 30 most recent conversation partners.
pub const DM_PARTNER_CAP: usize = 30;

/// Channel message logs are FIFO-capped. Applied uniformly across backends.
pub const CHANNEL_MESSAGE_CAP: usize = 500;

/// DM notifications carry a preview of the first 60 characters of the text.
pub const DM_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Online,
    Idle,
    Busy,
    #[default]
    Offline,
}

/// The persisted user record. The username is the immutable primary key and
/// is always stored lowercase. Credentials are NOT here — they belong to the
/// AuthProvider and live under a separate key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub status: UserStatus,
    /// Symmetric across the two records it connects.
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub requests_sent: Vec<String>,
    #[serde(default)]
    pub requests_received: Vec<String>,
    /// Newest-first, capped at NOTIFICATION_CAP.
    #[serde(default)]
    pub notifications: Vec<Notification>,
    /// Most-recent-first DM partner index, capped at DM_PARTNER_CAP.
    #[serde(default)]
    pub dm_partners: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: &str, display_name: &str) -> Self {
        Self {
            username: username.to_lowercase(),
            display_name: display_name.to_string(),
            avatar: None,
            banner: None,
            balance: 0,
            status: UserStatus::Offline,
            friends: Vec::new(),
            requests_sent: Vec::new(),
            requests_received: Vec::new(),
            notifications: Vec::new(),
            dm_partners: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccept,
    Dm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Time-ordered: millisecond timestamp plus a random hex suffix.
    pub id: String,
    pub kind: NotificationKind,
    pub from: String,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Monotonic false -> true; never reverts.
    pub read: bool,
}

/// One chat message. DM messages never carry reactions, so the map is empty
/// and skipped there; channel messages may populate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, Vec<String>>,
}

impl Message {
    pub fn new(sender: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.to_lowercase(),
            text: text.to_string(),
            sent_at: Utc::now(),
            reactions: BTreeMap::new(),
        }
    }
}

/// Append-only two-party conversation, stored under the canonical thread key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmThread {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Append-only channel log, stored under `bastion_msgs/<bastion>/<channel>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelLog {
    #[serde(default)]
    pub messages: Vec<Message>,
}
