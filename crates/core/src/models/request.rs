//! Session requests (topic proposals awaiting review).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RequestStatus, SessionId, SessionRequestId, UserId, Visibility};

/// A proposal for a session, moving through `pending -> approved | rejected`.
///
/// Invariants (upheld by [`crate::lifecycle`]):
/// - `status == Rejected` implies a non-empty `rejection_reason`
/// - `reviewer_id` and `reviewed_at` are both set or both `None`, and both
///   `None` while pending
/// - `linked_session_id` is set at most once, only while approved, and kept
///   even after that session is deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub id: SessionRequestId,
    pub title: String,
    pub description: String,
    pub requested_datetime: DateTime<Utc>,
    pub visibility: Visibility,
    pub status: RequestStatus,
    pub requester_id: UserId,
    pub reviewer_id: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub linked_session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRequest {
    /// Whether a session has already been created from this request.
    #[must_use]
    pub const fn is_materialized(&self) -> bool {
        self.linked_session_id.is_some()
    }
}
