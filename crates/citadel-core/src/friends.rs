//! The friend request lifecycle. Every operation touches two user records;
//! each record goes through a single-key CAS transaction, the pair is
//! best-effort (see `mutate_user`).

use citadel_types::models::NotificationKind;
use tracing::{debug, info};

use crate::{push_unique, remove_entry, SocialError, SocialGraph};

impl SocialGraph {
    /// Send a friend request. If the target already has a pending request
    /// toward the sender, the call auto-accepts instead of creating a second
    /// pending entry — two users who each click "add" still converge.
    pub async fn send_request(&self, from: &str, to: &str) -> Result<(), SocialError> {
        let from = from.to_lowercase();
        let to = to.to_lowercase();
        if from == to {
            return Err(SocialError::SelfReference);
        }

        let sender = self.read_user(&from).await?;
        self.read_user(&to).await?;

        if sender.friends.iter().any(|f| *f == to) {
            return Err(SocialError::AlreadyFriends(to));
        }
        if sender.requests_sent.iter().any(|r| *r == to) {
            return Err(SocialError::DuplicateRequest(to));
        }
        if sender.requests_received.iter().any(|r| *r == to) {
            debug!("{from} -> {to}: mutual request, accepting instead");
            return self.accept_request(&from, &to).await;
        }

        let target = to.clone();
        self.mutate_user(&from, move |user| push_unique(&mut user.requests_sent, &target))
            .await?
            .ok_or_else(|| SocialError::UnknownUser(from.clone()))?;

        let sender_name = from.clone();
        self.mutate_user(&to, move |user| {
            push_unique(&mut user.requests_received, &sender_name)
        })
        .await?
        .ok_or_else(|| SocialError::UnknownUser(to.clone()))?;

        self.push_notification(&to, NotificationKind::FriendRequest, &from, None)
            .await?;

        info!("{from} sent a friend request to {to}");
        Ok(())
    }

    /// Accept a pending request from `from`. Idempotent on the friends lists;
    /// clears pending entries in both directions on both records, and marks
    /// the now-resolved friend_request notification as read.
    pub async fn accept_request(&self, me: &str, from: &str) -> Result<(), SocialError> {
        let me = me.to_lowercase();
        let from = from.to_lowercase();
        if me == from {
            return Err(SocialError::SelfReference);
        }

        self.read_user(&me).await?;
        self.read_user(&from).await?;

        let other = from.clone();
        self.mutate_user(&me, move |user| {
            push_unique(&mut user.friends, &other);
            remove_entry(&mut user.requests_received, &other);
            remove_entry(&mut user.requests_sent, &other);
            for n in user.notifications.iter_mut() {
                if n.kind == NotificationKind::FriendRequest && n.from == other && !n.read {
                    n.read = true;
                }
            }
        })
        .await?
        .ok_or_else(|| SocialError::UnknownUser(me.clone()))?;

        let other = me.clone();
        self.mutate_user(&from, move |user| {
            push_unique(&mut user.friends, &other);
            remove_entry(&mut user.requests_sent, &other);
            remove_entry(&mut user.requests_received, &other);
        })
        .await?
        .ok_or_else(|| SocialError::UnknownUser(from.clone()))?;

        self.push_notification(&from, NotificationKind::FriendAccept, &me, None)
            .await?;

        info!("{me} accepted a friend request from {from}");
        Ok(())
    }

    /// Drop a pending request in both directions. Pure removal: succeeds even
    /// if no request was pending, and silently skips absent records.
    pub async fn decline_request(&self, me: &str, from: &str) -> Result<(), SocialError> {
        let me = me.to_lowercase();
        let from = from.to_lowercase();

        let other = from.clone();
        self.mutate_user(&me, move |user| {
            remove_entry(&mut user.requests_received, &other);
            remove_entry(&mut user.requests_sent, &other);
        })
        .await?;

        let other = me.clone();
        self.mutate_user(&from, move |user| {
            remove_entry(&mut user.requests_sent, &other);
            remove_entry(&mut user.requests_received, &other);
        })
        .await?;

        Ok(())
    }

    /// Remove a friendship in both directions. Unconditional: succeeds even
    /// if the two were not friends.
    pub async fn remove_friend(&self, me: &str, other: &str) -> Result<(), SocialError> {
        let me = me.to_lowercase();
        let other = other.to_lowercase();

        let target = other.clone();
        self.mutate_user(&me, move |user| remove_entry(&mut user.friends, &target))
            .await?;

        let target = me.clone();
        self.mutate_user(&other, move |user| remove_entry(&mut user.friends, &target))
            .await?;

        info!("{me} removed {other} from friends");
        Ok(())
    }
}
