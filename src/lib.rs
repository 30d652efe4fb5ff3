pub mod error;
pub mod history;
pub mod hub;
pub mod presence;
pub mod proto;
pub mod room;
pub mod session;
pub mod store;
pub mod ws;

use std::sync::Arc;

use axum::{Router, extract::FromRef, routing::get};
use sqlx::SqlitePool;

pub use error::{AppResult, ChatError};
use hub::ChatHub;
use presence::PresenceRegistry;
use store::MessageStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: MessageStore,
    pub hub: Arc<ChatHub>,
    pub presence: Arc<PresenceRegistry>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool) -> Self {
        let store = MessageStore::new(db_pool);
        AppState {
            store: store.clone(),
            hub: Arc::new(ChatHub::new(store)),
            presence: Arc::new(PresenceRegistry::new()),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/ws", get(ws::chat_ws))
        .route("/chat/admin/all", get(history::all_conversations))
        .route("/chat/{peer_id}", get(history::conversation))
}
