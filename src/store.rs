use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ChatError;

/// One persisted chat message. Immutable after insert; only the read flag is
/// ever touched later, and not by this service.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    /// Server-assigned, unix milliseconds. Orders history.
    pub created_at: i64,
    pub read: bool,
}

type MessageRow = (String, String, String, String, i64, bool);

impl Message {
    fn from_row((id, sender_id, receiver_id, body, created_at, read): MessageRow) -> Result<Message, ChatError> {
        Ok(Message {
            id: Uuid::parse_str(&id)?,
            sender_id,
            receiver_id,
            body,
            created_at,
            read,
        })
    }
}

/// Append-only record of every message, sole owner of the `messages` table.
#[derive(Clone)]
pub struct MessageStore {
    db_pool: SqlitePool,
}

const SELECT_COLUMNS: &str = "id,sender_id,receiver_id,body,created_at,read_flag";

impl MessageStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), ChatError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                read_flag BOOLEAN NOT NULL DEFAULT FALSE
            )",
        )
        .execute(&self.db_pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS messages_pair ON messages (sender_id, receiver_id)")
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    /// Persists one message, assigning its id and timestamp. Validation runs
    /// before the write; a rejected message leaves no trace.
    pub async fn append(&self, sender_id: &str, receiver_id: &str, body: &str) -> Result<Message, ChatError> {
        let sender_id = sender_id.trim();
        let receiver_id = receiver_id.trim();
        if sender_id.is_empty() || receiver_id.is_empty() {
            return Err(ChatError::validation("sender and receiver ids are required"));
        }
        if body.trim().is_empty() {
            return Err(ChatError::validation("message body is empty"));
        }

        let id = Uuid::now_v7();
        let created_at = unix_millis();
        sqlx::query(
            "INSERT INTO messages (id,sender_id,receiver_id,body,created_at,read_flag) VALUES (?,?,?,?,?,FALSE)",
        )
        .bind(id.to_string())
        .bind(sender_id)
        .bind(receiver_id)
        .bind(body)
        .bind(created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(Message {
            id,
            sender_id: sender_id.to_owned(),
            receiver_id: receiver_id.to_owned(),
            body: body.to_owned(),
            created_at,
            read: false,
        })
    }

    /// Everything the two users ever said to each other, oldest first,
    /// whichever of them sent it. A conversation with no messages is an
    /// empty list, not an error.
    pub async fn history(&self, a: &str, b: &str) -> Result<Vec<Message>, ChatError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages
             WHERE (sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?)
             ORDER BY created_at ASC, id ASC",
        ))
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(Message::from_row).collect()
    }

    /// Every message in the system, oldest first. Feeds the admin monitor.
    pub async fn all_messages(&self) -> Result<Vec<Message>, ChatError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages ORDER BY created_at ASC, id ASC",
        ))
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(Message::from_row).collect()
    }
}

fn unix_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
