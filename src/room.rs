use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Canonical key for a two-party conversation.
///
/// Both sides of a chat derive the same key no matter who opens it, so one
/// room is the fan-out scope for the whole conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Derives the room key for the pair `a`, `b`, in either order.
    ///
    /// The two ids are sorted before joining so the key is stable. A user
    /// cannot room with themself; a self-room would turn every broadcast
    /// into an echo loop.
    pub fn of(a: &str, b: &str) -> Result<RoomId, ChatError> {
        let a = a.trim();
        let b = b.trim();
        if a.is_empty() || b.is_empty() {
            return Err(ChatError::validation("both participant ids are required"));
        }
        if a == b {
            return Err(ChatError::validation("cannot open a conversation with yourself"));
        }

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Ok(RoomId(format!("{lo}-{hi}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let ab = RoomId::of("alice", "bob").unwrap();
        let ba = RoomId::of("bob", "alice").unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.as_str(), "alice-bob");
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(
            RoomId::of(" alice ", "bob").unwrap(),
            RoomId::of("bob", "alice").unwrap(),
        );
    }

    #[test]
    fn self_room_is_rejected() {
        assert!(matches!(
            RoomId::of("alice", "alice"),
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn empty_ids_are_rejected() {
        assert!(matches!(RoomId::of("", "bob"), Err(ChatError::Validation(_))));
        assert!(matches!(RoomId::of("alice", "  "), Err(ChatError::Validation(_))));
    }
}
