//! Unified error handling for the services and the JSON API.
//!
//! Every failure a caller can see is one of these kinds. `Unknown` means the
//! store did not confirm the outcome and is never reported as "did not
//! happen"; `Incomplete` means a session exists but some of its associations
//! may be missing.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use knowledge_share_core::{
    AccessDenied, DraftError, EditError, EmailError, SessionId, TransitionError,
};

use crate::db::RepositoryError;

const REFETCH_HINT: &str = "Reload the latest state before trying again.";
const UNKNOWN_HINT: &str = "The change may or may not have been applied. Reload before retrying.";
const REPAIR_HINT: &str = "Re-send the tags and guests with PUT /api/sessions/{id}/associations.";

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// No resolvable identity.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The identity lacks privilege for the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed or missing input.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A concurrent change won; the caller's view is stale.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store did not confirm the outcome in time.
    #[error("Outcome unknown: {0}")]
    Unknown(String),

    /// The session was created but a later step failed.
    #[error("Incomplete: {message}")]
    Incomplete {
        session_id: SessionId,
        message: String,
    },

    /// Store failure with a known outcome (nothing was written).
    #[error("Store error: {0}")]
    Store(RepositoryError),

    /// Cookie session storage failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl AppError {
    /// Short machine-readable kind, used as the `error` field of the body.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unknown(_) => "unknown",
            Self::Incomplete { .. } => "incomplete",
            Self::Store(_) | Self::Session(_) => "internal",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unknown(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Incomplete { .. } | Self::Store(_) | Self::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// `NotFound` for a missing entity of the given kind.
    #[must_use]
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} does not exist"))
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound("the record no longer exists".to_owned()),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::InvalidReference(msg) => Self::Validation(msg),
            RepositoryError::Unknown(msg) => Self::Unknown(msg),
            RepositoryError::Incomplete { session_id, reason } => Self::Incomplete {
                session_id,
                message: format!("session {session_id} was created but {reason}"),
            },
            other @ (RepositoryError::Database(_) | RepositoryError::DataCorruption(_)) => {
                Self::Store(other)
            }
        }
    }
}

impl From<AccessDenied> for AppError {
    fn from(e: AccessDenied) -> Self {
        Self::Forbidden(e.to_string())
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        if e.is_conflict() {
            Self::Conflict(e.to_string())
        } else {
            Self::Validation(e.to_string())
        }
    }
}

impl From<DraftError> for AppError {
    fn from(e: DraftError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<EditError> for AppError {
    fn from(e: EditError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<EmailError> for AppError {
    fn from(e: EmailError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<SessionId>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Store(_) | Self::Session(_) | Self::Incomplete { .. } => {
                let event_id = sentry::capture_error(&self);
                tracing::error!(
                    error = %self,
                    sentry_event_id = %event_id,
                    "Request error"
                );
            }
            Self::Unknown(_) => tracing::warn!(error = %self, "Store outcome unknown"),
            _ => tracing::debug!(error = %self, "Request rejected"),
        }

        let status = self.status();
        let hint = match &self {
            Self::Conflict(_) => Some(REFETCH_HINT.to_owned()),
            Self::Unknown(_) => Some(UNKNOWN_HINT.to_owned()),
            Self::Incomplete { .. } => Some(REPAIR_HINT.to_owned()),
            _ => None,
        };
        let session_id = match &self {
            Self::Incomplete { session_id, .. } => Some(*session_id),
            _ => None,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(_) | Self::Session(_) => "Internal server error".to_string(),
            Self::Unauthenticated(m)
            | Self::Forbidden(m)
            | Self::Validation(m)
            | Self::Conflict(m)
            | Self::NotFound(m)
            | Self::Unknown(m)
            | Self::Incomplete { message: m, .. } => m.clone(),
        };

        let body = ErrorBody {
            error: self.kind(),
            message,
            hint,
            session_id,
        };
        (status, Json(body)).into_response()
    }
}

/// Set the Sentry user context for the resolved identity.
pub fn set_sentry_user(user_id: knowledge_share_core::UserId, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context (on logout).
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
