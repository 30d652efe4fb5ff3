use serde::{Deserialize, Serialize};

use crate::{room::RoomId, store::Message};

/// Frames a client writes on the chat socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Register this connection as the user's live handle. Required before
    /// anything else; the identity itself comes from the session, never
    /// from the frame.
    Announce,
    /// Subscribe to the conversation with `peer_id`. The server derives the
    /// room key; clients do not get to pick one.
    JoinRoom { peer_id: String },
    SendMessage { receiver_id: String, body: String },
}

/// Frames the server writes back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomJoined { room_id: RoomId },
    /// Room-scoped echo included: a sender joined to the room receives its
    /// own message back and deduplicates by `sender_id`.
    ReceiveMessage { message: Message },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_use_the_original_event_names() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"join_room","peer_id":"bob"}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { peer_id } if peer_id == "bob"));

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"send_message","receiver_id":"bob","body":"hi"}"#)
                .unwrap();
        assert!(matches!(event, ClientEvent::SendMessage { .. }));

        let event: ClientEvent = serde_json::from_str(r#"{"type":"announce"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Announce));
    }

    #[test]
    fn unknown_frames_fail_to_parse() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"leave_room"}"#).is_err());
    }

    #[test]
    fn server_frames_are_tagged() {
        let json = serde_json::to_string(&ServerEvent::Error {
            message: "nope".to_owned(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"error","message":"nope"}"#);
    }
}
