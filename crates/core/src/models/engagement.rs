//! Interest markers and discussion comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommentId, InterestId, SessionId, UserId};

/// "I'm interested" marker. At most one per `(session_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInterest {
    pub id: InterestId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A comment on a session. Only its author may change or remove it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub session_id: SessionId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    #[must_use]
    pub fn is_edited(&self) -> bool {
        self.updated_at != self.created_at
    }
}
