use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use tower_sessions::Session;

use crate::{error::AppResult, session, store::{Message, MessageStore}};

/// Full backlog of the conversation between the caller and `peer_id`, oldest
/// first. Works whether or not either side is connected live; always reads
/// the store fresh.
#[debug_handler(state = crate::AppState)]
pub async fn conversation(
    Path(peer_id): Path<String>,
    State(store): State<MessageStore>,
    session: Session,
) -> AppResult<Json<Vec<Message>>> {
    let user_id = session::require_user(&session).await?;
    Ok(Json(store.history(&user_id, &peer_id).await?))
}

/// Every message across every conversation, for the admin chat monitor.
/// Role enforcement lives with the auth layer in front of this service.
#[debug_handler(state = crate::AppState)]
pub async fn all_conversations(
    State(store): State<MessageStore>,
    session: Session,
) -> AppResult<Json<Vec<Message>>> {
    session::require_user(&session).await?;
    Ok(Json(store.all_messages().await?))
}
