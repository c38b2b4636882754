//! Scheduled sessions and their tag/guest associations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{SessionId, TagId, UserId, Visibility};

/// A scheduled knowledge-sharing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub description: String,
    pub datetime: DateTime<Utc>,
    pub presentation_url: Option<String>,
    pub recording_url: Option<String>,
    pub visibility: Visibility,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A session whose start time is at or before `now` has happened.
    #[must_use]
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.datetime <= now
    }
}

/// A globally shared label. Names are not unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Color given to tags created without one.
    pub const DEFAULT_COLOR: &'static str = "#27A4F6";
}

/// Extra viewer of a private session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionGuest {
    pub session_id: SessionId,
    pub user_id: UserId,
}
