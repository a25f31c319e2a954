//! DM threads and bastion channel logs. Appends and reaction toggles go
//! through single-key transactions so concurrent writers on the same thread
//! or message cannot lose each other's updates.

use citadel_store::Tx;
use citadel_types::keys;
use citadel_types::models::{
    ChannelLog, DmThread, Message, NotificationKind, CHANNEL_MESSAGE_CAP, DM_PARTNER_CAP,
    DM_PREVIEW_CHARS,
};
use tracing::info;
use uuid::Uuid;

use crate::{SocialError, SocialGraph};

/// Move `partner` to the front of the index, deduplicated and capped.
fn bump_partner(index: &mut Vec<String>, partner: &str) {
    index.retain(|entry| entry != partner);
    index.insert(0, partner.to_string());
    index.truncate(DM_PARTNER_CAP);
}

impl SocialGraph {
    /// Send a direct message. Appends to the canonical thread, refreshes both
    /// partner indexes, and notifies the recipient with a text preview. The
    /// message counts as delivered once persisted.
    pub async fn send_direct(
        &self,
        from: &str,
        to: &str,
        text: &str,
    ) -> Result<Message, SocialError> {
        let from = from.to_lowercase();
        let to = to.to_lowercase();
        if from == to {
            return Err(SocialError::SelfReference);
        }

        self.read_user(&from).await?;
        self.read_user(&to).await?;

        let message = Message::new(&from, text);
        let appended = message.clone();
        self.store()
            .transaction(
                &keys::thread_key(&from, &to),
                Box::new(move |old| {
                    let mut thread: DmThread = old
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    thread.messages.push(appended.clone());
                    match serde_json::to_value(&thread) {
                        Ok(value) => Tx::Write(value),
                        Err(_) => Tx::Abort,
                    }
                }),
            )
            .await?;

        let partner = to.clone();
        self.mutate_user(&from, move |user| bump_partner(&mut user.dm_partners, &partner))
            .await?;
        let partner = from.clone();
        self.mutate_user(&to, move |user| bump_partner(&mut user.dm_partners, &partner))
            .await?;

        let preview: String = text.chars().take(DM_PREVIEW_CHARS).collect();
        self.push_notification(&to, NotificationKind::Dm, &from, Some(preview))
            .await?;

        Ok(message)
    }

    /// Messages of the two-party thread, in send order. An unopened thread is
    /// an empty list, not an error.
    pub async fn thread(&self, a: &str, b: &str) -> Result<Vec<Message>, SocialError> {
        match self.store().get(&keys::thread_key(a, b)).await? {
            Some(value) => {
                let thread: DmThread =
                    serde_json::from_value(value).map_err(citadel_store::StoreError::from)?;
                Ok(thread.messages)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Append to a channel log, evicting oldest messages past the cap.
    pub async fn send_channel(
        &self,
        bastion_id: &str,
        channel_id: &str,
        from: &str,
        text: &str,
    ) -> Result<Message, SocialError> {
        let from = from.to_lowercase();
        self.read_user(&from).await?;

        let message = Message::new(&from, text);
        let appended = message.clone();
        self.store()
            .transaction(
                &keys::channel_key(bastion_id, channel_id),
                Box::new(move |old| {
                    let mut log: ChannelLog = old
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    log.messages.push(appended.clone());
                    if log.messages.len() > CHANNEL_MESSAGE_CAP {
                        let excess = log.messages.len() - CHANNEL_MESSAGE_CAP;
                        log.messages.drain(..excess);
                    }
                    match serde_json::to_value(&log) {
                        Ok(value) => Tx::Write(value),
                        Err(_) => Tx::Abort,
                    }
                }),
            )
            .await?;

        Ok(message)
    }

    pub async fn channel_messages(
        &self,
        bastion_id: &str,
        channel_id: &str,
    ) -> Result<Vec<Message>, SocialError> {
        match self.store().get(&keys::channel_key(bastion_id, channel_id)).await? {
            Some(value) => {
                let log: ChannelLog =
                    serde_json::from_value(value).map_err(citadel_store::StoreError::from)?;
                Ok(log.messages)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Toggle `user`'s reaction on a channel message. Returns `Some(true)` if
    /// the reaction was added, `Some(false)` if removed, and `None` (silent
    /// no-op) when the message does not exist. The whole toggle is one CAS
    /// transaction, so concurrent toggles on the same emoji never lose
    /// updates.
    pub async fn toggle_reaction(
        &self,
        bastion_id: &str,
        channel_id: &str,
        message_id: Uuid,
        emoji: &str,
        user: &str,
    ) -> Result<Option<bool>, SocialError> {
        let user = user.to_lowercase();
        let emoji = emoji.to_string();

        let toggling_user = user.clone();
        let toggling_emoji = emoji.clone();
        let committed = self
            .store()
            .transaction(
                &keys::channel_key(bastion_id, channel_id),
                Box::new(move |old| {
                    let Some(value) = old else {
                        return Tx::Abort;
                    };
                    let Ok(mut log) = serde_json::from_value::<ChannelLog>(value) else {
                        return Tx::Abort;
                    };
                    let Some(message) =
                        log.messages.iter_mut().find(|m| m.id == message_id)
                    else {
                        return Tx::Abort;
                    };

                    let reactors = message
                        .reactions
                        .entry(toggling_emoji.clone())
                        .or_default();
                    if reactors.iter().any(|r| *r == toggling_user) {
                        reactors.retain(|r| *r != toggling_user);
                    } else {
                        reactors.push(toggling_user.clone());
                    }
                    if reactors.is_empty() {
                        message.reactions.remove(&toggling_emoji);
                    }

                    match serde_json::to_value(&log) {
                        Ok(value) => Tx::Write(value),
                        Err(_) => Tx::Abort,
                    }
                }),
            )
            .await?;

        // Read the outcome off the committed value rather than smuggling a
        // flag out of the closure.
        let Some(value) = committed else {
            return Ok(None);
        };
        let log: ChannelLog =
            serde_json::from_value(value).map_err(citadel_store::StoreError::from)?;
        let added = log
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| {
                m.reactions
                    .get(&emoji)
                    .is_some_and(|reactors| reactors.iter().any(|r| *r == user))
            })
            .unwrap_or(false);

        info!(
            "{user} {} {emoji} on message {message_id}",
            if added { "added" } else { "removed" }
        );
        Ok(Some(added))
    }
}
