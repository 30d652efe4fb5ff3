use std::collections::HashMap;

use log::warn;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::ChatError,
    presence::ConnectionHandle,
    proto::ServerEvent,
    room::RoomId,
    store::{Message, MessageStore},
};

/// Room membership and fan-out. Persist first, then emit: a message that
/// failed the durable write is never broadcast, and a dead subscriber never
/// rolls back the write or blocks the rest of the room.
pub struct ChatHub {
    store: MessageStore,
    rooms: Mutex<HashMap<RoomId, HashMap<Uuid, ConnectionHandle>>>,
}

impl ChatHub {
    pub fn new(store: MessageStore) -> Self {
        Self {
            store,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Subscribes a connection to a room. Idempotent: rejoining a room the
    /// connection already sits in changes nothing.
    pub async fn join(&self, room: RoomId, handle: ConnectionHandle) {
        let mut rooms = self.rooms.lock().await;
        rooms.entry(room).or_default().insert(handle.conn_id, handle);
    }

    /// Removes the connection from every room it joined. Rooms with no
    /// members left evaporate.
    pub async fn leave_all(&self, conn_id: Uuid) {
        let mut rooms = self.rooms.lock().await;
        for members in rooms.values_mut() {
            members.remove(&conn_id);
        }
        rooms.retain(|_, members| !members.is_empty());
    }

    /// Persists the message and broadcasts it to the conversation's room,
    /// sender's own subscribed connections included.
    ///
    /// The membership lock is held across the whole emit, so two messages
    /// sent into the same room reach every subscriber in send order.
    pub async fn send(&self, sender_id: &str, receiver_id: &str, body: &str) -> Result<Message, ChatError> {
        let room = RoomId::of(sender_id, receiver_id)?;
        let message = self.store.append(sender_id, receiver_id, body).await?;

        let rooms = self.rooms.lock().await;
        if let Some(members) = rooms.get(&room) {
            for handle in members.values() {
                let event = ServerEvent::ReceiveMessage {
                    message: message.clone(),
                };
                if let Err(err) = handle.deliver(event) {
                    warn!("skipping one subscriber in {room}: {err}");
                }
            }
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::store::tests::memory_store;

    async fn hub() -> ChatHub {
        ChatHub::new(memory_store().await)
    }

    fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Uuid::now_v7(), tx), rx)
    }

    fn received_body(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Option<String> {
        match rx.try_recv().ok()? {
            ServerEvent::ReceiveMessage { message } => Some(message.body),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_room_member_including_sender() {
        let hub = hub().await;
        let room = RoomId::of("alice", "bob").unwrap();
        let (alice, mut alice_rx) = connection();
        let (bob, mut bob_rx) = connection();
        hub.join(room.clone(), alice).await;
        hub.join(room, bob).await;

        hub.send("alice", "bob", "hi").await.unwrap();

        assert_eq!(received_body(&mut alice_rx).as_deref(), Some("hi"));
        assert_eq!(received_body(&mut bob_rx).as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn double_join_delivers_once() {
        let hub = hub().await;
        let room = RoomId::of("alice", "bob").unwrap();
        let (bob, mut bob_rx) = connection();
        hub.join(room.clone(), bob.clone()).await;
        hub.join(room, bob).await;

        hub.send("alice", "bob", "hi").await.unwrap();

        assert!(received_body(&mut bob_rx).is_some());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_receiver_still_gets_the_message_persisted() {
        let hub = hub().await;
        // bob never joined anything
        hub.send("alice", "bob", "hi").await.unwrap();

        let backlog = hub.store().history("alice", "bob").await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].body, "hi");
    }

    #[tokio::test]
    async fn departed_connection_receives_nothing_further() {
        let hub = hub().await;
        let room = RoomId::of("alice", "bob").unwrap();
        let (bob, mut bob_rx) = connection();
        hub.join(room, bob.clone()).await;
        hub.leave_all(bob.conn_id).await;

        hub.send("alice", "bob", "hi").await.unwrap();

        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_all_spans_every_joined_room() {
        let hub = hub().await;
        let (bob, mut bob_rx) = connection();
        hub.join(RoomId::of("alice", "bob").unwrap(), bob.clone()).await;
        hub.join(RoomId::of("carol", "bob").unwrap(), bob.clone()).await;
        hub.leave_all(bob.conn_id).await;

        hub.send("alice", "bob", "one").await.unwrap();
        hub.send("carol", "bob", "two").await.unwrap();

        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn blank_body_aborts_before_persist_and_broadcast() {
        let hub = hub().await;
        let room = RoomId::of("alice", "bob").unwrap();
        let (bob, mut bob_rx) = connection();
        hub.join(room, bob).await;

        assert!(matches!(
            hub.send("alice", "bob", "   ").await,
            Err(ChatError::Validation(_))
        ));
        assert!(bob_rx.try_recv().is_err());
        assert!(hub.store().history("alice", "bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_send_is_rejected() {
        let hub = hub().await;
        assert!(matches!(
            hub.send("alice", "alice", "hi").await,
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn back_to_back_sends_arrive_in_send_order() {
        let hub = hub().await;
        let room = RoomId::of("alice", "bob").unwrap();
        let (observer, mut rx) = connection();
        hub.join(room, observer).await;

        hub.send("alice", "bob", "first").await.unwrap();
        hub.send("bob", "alice", "second").await.unwrap();

        assert_eq!(received_body(&mut rx).as_deref(), Some("first"));
        assert_eq!(received_body(&mut rx).as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn one_dead_subscriber_does_not_stop_the_rest() {
        let hub = hub().await;
        let room = RoomId::of("alice", "bob").unwrap();
        let (dead, dead_rx) = connection();
        let (bob, mut bob_rx) = connection();
        hub.join(room.clone(), dead).await;
        hub.join(room, bob).await;
        drop(dead_rx);

        hub.send("alice", "bob", "hi").await.unwrap();

        assert_eq!(received_body(&mut bob_rx).as_deref(), Some("hi"));
    }
}
