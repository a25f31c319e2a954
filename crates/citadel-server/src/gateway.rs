use std::sync::Arc;

use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use citadel_sync::{SessionListener, Subscription};
use citadel_types::events::{GatewayCommand, SyncEvent};
use citadel_types::models::{Message, Notification, UserStatus};

use crate::auth::AppState;
use crate::middleware::decode_token;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    token: String,
}

/// Authenticate at the HTTP upgrade layer; the socket itself never carries
/// credentials.
pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let claims =
        decode_token(&state.jwt_secret, &query.token).ok_or(StatusCode::UNAUTHORIZED)?;

    let username = claims.sub;
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, username)))
}

/// Bridges one session subscription onto one WebSocket. Callbacks land on
/// an unbounded channel; the socket send task drains it.
struct SocketListener {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl SessionListener for SocketListener {
    fn on_new_notification(&self, notification: &Notification) {
        let _ = self.tx.send(SyncEvent::NotificationAdded {
            notification: notification.clone(),
        });
    }

    fn on_new_dm(&self, partner: &str, message: &Message) {
        let _ = self.tx.send(SyncEvent::DmMessage {
            partner: partner.to_string(),
            message: message.clone(),
        });
    }

    fn on_friend_request(&self, from: &str) {
        let _ = self.tx.send(SyncEvent::FriendRequest {
            from: from.to_string(),
        });
    }

    fn on_friend_accept(&self, from: &str) {
        let _ = self.tx.send(SyncEvent::FriendAccept {
            from: from.to_string(),
        });
    }

    fn on_status_change(&self, username: &str, status: UserStatus) {
        let _ = self.tx.send(SyncEvent::StatusChange {
            username: username.to_string(),
            status,
        });
    }
}

async fn handle_connection(socket: WebSocket, state: AppState, username: String) {
    let (mut sender, mut receiver) = socket.split();

    info!("{username} connected to gateway");

    let ready = SyncEvent::Ready {
        username: username.clone(),
    };
    if sender
        .send(WsMessage::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .sync
        .subscribe(&username, Arc::new(SocketListener { tx: tx.clone() }))
        .await;

    if let Err(err) = state.graph.set_status(&username, UserStatus::Online).await {
        warn!("{username}: failed to go online: {err}");
    }

    // Forward sync events -> client
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = serde_json::to_string(&event).unwrap();
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Read commands from client
    let state_recv = state.clone();
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        // Scoped channel subscriptions live and die with this connection.
        let mut channel_subs: Vec<Subscription> = Vec::new();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&state_recv, &username_recv, cmd, &tx, &mut channel_subs)
                            .await;
                    }
                    Err(e) => {
                        warn!(
                            "{username_recv} bad command: {e} -- raw: {}",
                            &text[..text.len().min(200)]
                        );
                    }
                },
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.sync.unsubscribe(&username);
    if let Err(err) = state.graph.set_status(&username, UserStatus::Offline).await {
        warn!("{username}: failed to go offline: {err}");
    }
    info!("{username} disconnected from gateway");
}

async fn handle_command(
    state: &AppState,
    username: &str,
    cmd: GatewayCommand,
    tx: &mpsc::UnboundedSender<SyncEvent>,
    channel_subs: &mut Vec<Subscription>,
) {
    match cmd {
        GatewayCommand::SubscribeChannels { channels } => {
            info!("{username} subscribing to {} channels", channels.len());
            channel_subs.clear();
            for channel in channels {
                let events = tx.clone();
                let bastion_id = channel.bastion_id.clone();
                let channel_id = channel.channel_id.clone();
                let subscription = state
                    .sync
                    .subscribe_channel(&channel.bastion_id, &channel.channel_id, move |message| {
                        let _ = events.send(SyncEvent::ChannelMessage {
                            bastion_id: bastion_id.clone(),
                            channel_id: channel_id.clone(),
                            message: message.clone(),
                        });
                    })
                    .await;
                channel_subs.push(subscription);
            }
        }

        GatewayCommand::SetStatus { status } => {
            if let Err(err) = state.graph.set_status(username, status).await {
                warn!("{username}: status update failed: {err}");
            }
        }
    }
}
