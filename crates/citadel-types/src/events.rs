use serde::{Deserialize, Serialize};

use crate::models::{Message, Notification, UserStatus};

/// Events fanned out to subscribed sessions, and sent over the WebSocket
/// gateway as tagged JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SyncEvent {
    /// Gateway confirms the session is established.
    Ready { username: String },

    /// A notification was appended to this session's log.
    NotificationAdded { notification: Notification },

    /// A new message arrived in one of this session's DM threads.
    DmMessage { partner: String, message: Message },

    /// Someone sent this session's user a friend request.
    FriendRequest { from: String },

    /// Someone accepted this session's user's friend request.
    FriendAccept { from: String },

    /// A friend's presence status changed.
    StatusChange {
        username: String,
        status: UserStatus,
    },

    /// A message was appended to a subscribed channel.
    ChannelMessage {
        bastion_id: String,
        channel_id: String,
        message: Message,
    },
}

/// Commands a gateway client sends over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Replace the set of channels this connection receives
    /// [`SyncEvent::ChannelMessage`] events for.
    SubscribeChannels { channels: Vec<ChannelRef> },

    /// Update the session user's presence status.
    SetStatus { status: UserStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub bastion_id: String,
    pub channel_id: String,
}
