use tower_sessions::Session;

use crate::error::ChatError;

/// Session key the auth service stores the signed-in user's id under.
pub const USER_ID: &str = "user_id";

/// Identity the auth layer attached to this session. Chat endpoints trust it
/// verbatim and refuse to run without it.
pub async fn require_user(session: &Session) -> Result<String, ChatError> {
    session
        .get::<String>(USER_ID)
        .await?
        .ok_or(ChatError::Unauthorized("sign in before using chat"))
}
