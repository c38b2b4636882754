//! Session-request state machine.
//!
//! ```text
//!   pending ──approve──▶ approved ──materialize──▶ approved + linked session
//!      │
//!      └────reject─────▶ rejected
//! ```
//!
//! The functions here only decide whether a transition is legal and what it
//! writes. Stores apply the resulting [`Review`] with a compare-and-set on
//! `status = 'pending'` so a concurrent reviewer loses with a conflict instead
//! of overwriting.

use chrono::{DateTime, Utc};

use crate::models::SessionRequest;
use crate::types::{RequestStatus, SessionId, UserId};

/// A transition that is not legal from the request's current state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Only pending requests can be reviewed.
    #[error("request is already {status}")]
    NotPending { status: RequestStatus },
    /// Only approved requests can become sessions.
    #[error("request is {status}, only approved requests can be scheduled")]
    NotApproved { status: RequestStatus },
    /// The request already points at a session.
    #[error("request has already been scheduled as session {session_id}")]
    AlreadyMaterialized { session_id: SessionId },
    /// Rejections must say why.
    #[error("a rejection reason is required")]
    EmptyReason,
}

impl TransitionError {
    /// Whether the caller's view of the request is stale, as opposed to the
    /// input itself being invalid.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        !matches!(self, Self::EmptyReason)
    }
}

/// A reviewer's decision on a pending request, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub status: RequestStatus,
    pub reviewer_id: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
}

impl Review {
    /// Write this decision onto an in-memory request.
    pub fn apply_to(&self, request: &mut SessionRequest) {
        request.status = self.status;
        request.reviewer_id = Some(self.reviewer_id);
        request.reviewed_at = Some(self.reviewed_at);
        request.rejection_reason.clone_from(&self.rejection_reason);
        request.updated_at = self.reviewed_at;
    }
}

fn ensure_pending(request: &SessionRequest) -> Result<(), TransitionError> {
    match request.status {
        RequestStatus::Pending => Ok(()),
        status => Err(TransitionError::NotPending { status }),
    }
}

/// `pending -> approved`.
///
/// # Errors
///
/// [`TransitionError::NotPending`] if the request was already reviewed.
pub fn approve(
    request: &SessionRequest,
    reviewer_id: UserId,
    now: DateTime<Utc>,
) -> Result<Review, TransitionError> {
    ensure_pending(request)?;
    Ok(Review {
        status: RequestStatus::Approved,
        reviewer_id,
        reviewed_at: now,
        rejection_reason: None,
    })
}

/// `pending -> rejected`. The reason is trimmed and must not be empty.
///
/// The reason is checked before the status so a blank rejection is always
/// reported as invalid input.
///
/// # Errors
///
/// [`TransitionError::EmptyReason`] for a blank reason, otherwise
/// [`TransitionError::NotPending`] if the request was already reviewed.
pub fn reject(
    request: &SessionRequest,
    reviewer_id: UserId,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Review, TransitionError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(TransitionError::EmptyReason);
    }
    ensure_pending(request)?;
    Ok(Review {
        status: RequestStatus::Rejected,
        reviewer_id,
        reviewed_at: now,
        rejection_reason: Some(reason.to_owned()),
    })
}

/// Whether a session may be created from this request right now.
///
/// # Errors
///
/// [`TransitionError::NotApproved`] unless the request is approved, and
/// [`TransitionError::AlreadyMaterialized`] once it is linked to a session.
pub fn ensure_materializable(request: &SessionRequest) -> Result<(), TransitionError> {
    if request.status != RequestStatus::Approved {
        return Err(TransitionError::NotApproved {
            status: request.status,
        });
    }
    match request.linked_session_id {
        Some(session_id) => Err(TransitionError::AlreadyMaterialized { session_id }),
        None => Ok(()),
    }
}
