use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use citadel_core::SocialGraph;
use citadel_store::{SocialStore, SqliteStore};
use citadel_sync::SyncLayer;

mod auth;
mod friends;
mod gateway;
mod messages;
mod middleware;
mod notifications;
mod outcome;
mod profile;

use auth::{AppState, AppStateInner, CredentialVault};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "citadel=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CITADEL_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("CITADEL_DB_PATH").unwrap_or_else(|_| "citadel.db".into());
    let host = std::env::var("CITADEL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CITADEL_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Backend and shared state
    let store: Arc<dyn SocialStore> = Arc::new(SqliteStore::open(&PathBuf::from(&db_path))?);
    let graph = SocialGraph::new(store.clone());
    let sync = Arc::new(SyncLayer::new(store.clone()));
    let state: AppState = Arc::new(AppStateInner {
        graph,
        sync,
        vault: CredentialVault::new(store),
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/friends", get(friends::list))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests/{from}/accept", post(friends::accept))
        .route("/friends/requests/{from}/decline", post(friends::decline))
        .route("/friends/{username}", delete(friends::remove))
        .route("/profile", get(profile::me).patch(profile::update))
        .route("/status", post(profile::set_status))
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread", get(notifications::unread))
        .route("/notifications/read", post(notifications::mark_all_read))
        .route("/dms/{partner}", get(messages::dm_thread).post(messages::send_dm))
        .route(
            "/bastions/{bastion_id}/channels/{channel_id}/messages",
            get(messages::channel_messages).post(messages::send_channel_message),
        )
        .route(
            "/bastions/{bastion_id}/channels/{channel_id}/messages/{message_id}/reactions",
            post(messages::toggle_reaction),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(gateway::upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Citadel server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
