use std::{collections::HashSet, sync::Arc};

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use log::info;
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppResult, ChatError},
    hub::ChatHub,
    presence::{ConnectionHandle, PresenceRegistry},
    proto::{ClientEvent, ServerEvent},
    room::RoomId,
    session,
};

/// Per-connection state. A connection starts unjoined, becomes present on
/// `announce`, and collects one joined room per open conversation. Everything
/// here dies with the socket.
struct Connection {
    user_id: String,
    handle: ConnectionHandle,
    announced: bool,
    joined: HashSet<RoomId>,
}

/// Upgrades `/chat/ws`. The session must already carry an identity; an
/// unauthenticated upgrade is refused before any socket exists.
#[debug_handler(state = AppState)]
pub async fn chat_ws(
    State(hub): State<Arc<ChatHub>>,
    State(presence): State<Arc<PresenceRegistry>>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let user_id = session::require_user(&session).await?;
    Ok(ws.on_upgrade(move |socket| run_connection(socket, user_id, hub, presence)))
}

async fn run_connection(
    socket: WebSocket,
    user_id: String,
    hub: Arc<ChatHub>,
    presence: Arc<PresenceRegistry>,
) {
    let conn_id = Uuid::now_v7();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(WsMessage::from(text)).await.is_err() {
                break;
            }
        }
    });

    let mut conn = Connection {
        user_id,
        handle: ConnectionHandle::new(conn_id, tx),
        announced: false,
        joined: HashSet::new(),
    };

    info!("connection {conn_id} opened for {}", conn.user_id);

    while let Some(Ok(frame)) = stream.next().await {
        let WsMessage::Text(text) = frame else {
            continue;
        };
        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(err) => {
                let _ = conn.handle.deliver(ServerEvent::Error {
                    message: format!("unreadable frame: {err}"),
                });
                continue;
            }
        };
        if let Err(err) = handle_event(event, &mut conn, &hub, &presence).await {
            let _ = conn.handle.deliver(ServerEvent::Error {
                message: err.to_string(),
            });
        }
    }

    // Closed. Presence goes first so nothing can pick this handle up again,
    // then the connection leaves every room it had joined.
    presence.forget(conn_id).await;
    hub.leave_all(conn_id).await;
    writer.abort();
    info!("connection {conn_id} closed for {}", conn.user_id);
}

async fn handle_event(
    event: ClientEvent,
    conn: &mut Connection,
    hub: &ChatHub,
    presence: &PresenceRegistry,
) -> Result<(), ChatError> {
    match event {
        ClientEvent::Announce => {
            presence.announce(&conn.user_id, conn.handle.clone()).await;
            conn.announced = true;
        }
        ClientEvent::JoinRoom { peer_id } => {
            if !conn.announced {
                return Err(ChatError::Unauthorized("announce presence before joining a room"));
            }
            let room = RoomId::of(&conn.user_id, &peer_id)?;
            if conn.joined.insert(room.clone()) {
                hub.join(room.clone(), conn.handle.clone()).await;
            }
            conn.handle.deliver(ServerEvent::RoomJoined { room_id: room })?;
        }
        ClientEvent::SendMessage { receiver_id, body } => {
            if !conn.announced {
                return Err(ChatError::Unauthorized("announce presence before sending"));
            }
            hub.send(&conn.user_id, &receiver_id, &body).await?;
        }
    }
    Ok(())
}
