//! Access rules for sessions, requests, comments and user management.
//!
//! Every enforcement point goes through [`authorize`] with a [`Capability`]
//! instead of checking roles inline. Decisions are pure functions of the
//! identity and the rows passed in; callers re-load both on every request.

use crate::models::{Comment, Identity, Session, SessionRequest};
use crate::types::{RequestStatus, Role, UserId, Visibility};

/// Something an identity is asking to do.
#[derive(Debug, Clone, Copy)]
pub enum Capability<'a> {
    /// Read a session and its associations.
    ViewSession {
        session: &'a Session,
        guests: &'a [UserId],
    },
    /// Change a session's fields, tags or guests.
    EditSession(&'a Session),
    /// Remove a session.
    DeleteSession(&'a Session),
    /// Create a session directly, without a request.
    CreateSession,
    /// Approve or reject requests.
    ReviewRequests,
    /// Read a single request.
    ViewRequest(&'a SessionRequest),
    /// Turn an approved request into a session.
    MaterializeRequest(&'a SessionRequest),
    /// Edit or delete a comment.
    ModifyComment(&'a Comment),
    /// Change roles and remove accounts.
    ManageUsers,
}

impl Capability<'_> {
    const fn describe(&self) -> &'static str {
        match self {
            Self::ViewSession { .. } => "view this session",
            Self::EditSession(_) => "edit this session",
            Self::DeleteSession(_) => "delete this session",
            Self::CreateSession => "create sessions",
            Self::ReviewRequests => "review session requests",
            Self::ViewRequest(_) => "view this request",
            Self::MaterializeRequest(_) => "create a session from this request",
            Self::ModifyComment(_) => "change a comment you did not write",
            Self::ManageUsers => "manage users",
        }
    }
}

/// The identity lacks the privilege for the requested capability.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{role} user is not allowed to {action}")]
pub struct AccessDenied {
    pub role: Role,
    pub action: &'static str,
}

/// Check a capability, returning a human-readable denial when it is missing.
///
/// # Errors
///
/// Returns [`AccessDenied`] when [`permits`] is false.
pub fn authorize(identity: &Identity, capability: Capability<'_>) -> Result<(), AccessDenied> {
    if permits(identity, capability) {
        Ok(())
    } else {
        Err(AccessDenied {
            role: identity.role,
            action: capability.describe(),
        })
    }
}

/// Boolean form of [`authorize`].
#[must_use]
pub fn permits(identity: &Identity, capability: Capability<'_>) -> bool {
    match capability {
        Capability::ViewSession { session, guests } => can_view(identity, session, guests),
        Capability::EditSession(session) => can_edit(identity, session),
        Capability::DeleteSession(session) => can_delete(identity, session),
        Capability::CreateSession | Capability::ReviewRequests => can_review(identity),
        Capability::ViewRequest(request) => {
            can_review(identity) || request.requester_id == identity.id
        }
        Capability::MaterializeRequest(request) => {
            can_review(identity) || can_self_promote(identity, request)
        }
        Capability::ModifyComment(comment) => comment.author_id == identity.id,
        Capability::ManageUsers => identity.is_admin(),
    }
}

/// Privileged, public, owned, or guest-listed.
#[must_use]
pub fn can_view(identity: &Identity, session: &Session, guests: &[UserId]) -> bool {
    identity.is_privileged()
        || session.visibility == Visibility::Public
        || session.owner_id == identity.id
        || guests.contains(&identity.id)
}

/// Privileged or owner.
#[must_use]
pub fn can_edit(identity: &Identity, session: &Session) -> bool {
    identity.is_privileged() || session.owner_id == identity.id
}

/// Same predicate as [`can_edit`]: owners may delete what they own.
#[must_use]
pub fn can_delete(identity: &Identity, session: &Session) -> bool {
    can_edit(identity, session)
}

/// Planners and admins review requests.
#[must_use]
pub const fn can_review(identity: &Identity) -> bool {
    identity.is_privileged()
}

/// A basic user may materialize their own request once it is approved.
#[must_use]
pub fn can_self_promote(identity: &Identity, request: &SessionRequest) -> bool {
    identity.role == Role::Basic
        && request.status == RequestStatus::Approved
        && request.requester_id == identity.id
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::{CommentId, Email, SessionId, SessionRequestId};

    fn identity(role: Role) -> Identity {
        Identity {
            id: UserId::generate(),
            email: Email::parse("member@example.com").unwrap(),
            display_name: "Member".to_owned(),
            role,
        }
    }

    fn session(owner: UserId, visibility: Visibility) -> Session {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap();
        Session {
            id: SessionId::generate(),
            title: "Ownership in practice".to_owned(),
            description: String::new(),
            datetime: at,
            presentation_url: None,
            recording_url: None,
            visibility,
            owner_id: owner,
            created_at: at,
            updated_at: at,
        }
    }

    fn request(requester: UserId, status: RequestStatus) -> SessionRequest {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        SessionRequest {
            id: SessionRequestId::generate(),
            title: "Intro to Rust".to_owned(),
            description: String::new(),
            requested_datetime: at,
            visibility: Visibility::Public,
            status,
            requester_id: requester,
            reviewer_id: None,
            reviewed_at: None,
            rejection_reason: None,
            linked_session_id: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_can_view_exhaustive() {
        for bits in 0u8..16 {
            let privileged = bits & 1 != 0;
            let public = bits & 2 != 0;
            let owner = bits & 4 != 0;
            let guest = bits & 8 != 0;

            let viewer = identity(if privileged { Role::Planner } else { Role::Basic });
            let owner_id = if owner { viewer.id } else { UserId::generate() };
            let visibility = if public {
                Visibility::Public
            } else {
                Visibility::Private
            };
            let s = session(owner_id, visibility);
            let guests = if guest { vec![viewer.id] } else { vec![UserId::generate()] };

            let expected = privileged || public || owner || guest;
            assert_eq!(
                can_view(&viewer, &s, &guests),
                expected,
                "privileged={privileged} public={public} owner={owner} guest={guest}"
            );
        }
    }

    #[test]
    fn test_admin_views_private_without_guest_entry() {
        let admin = identity(Role::Admin);
        let s = session(UserId::generate(), Visibility::Private);
        assert!(permits(
            &admin,
            Capability::ViewSession {
                session: &s,
                guests: &[]
            }
        ));
    }

    #[test]
    fn test_edit_and_delete_match() {
        for role in Role::ALL {
            let actor = identity(*role);
            let owned = session(actor.id, Visibility::Private);
            let foreign = session(UserId::generate(), Visibility::Public);
            assert!(can_edit(&actor, &owned));
            assert_eq!(can_edit(&actor, &foreign), role.is_privileged());
            assert_eq!(can_delete(&actor, &foreign), can_edit(&actor, &foreign));
        }
    }

    #[test]
    fn test_self_promote_requires_basic_owner_and_approval() {
        let basic = identity(Role::Basic);
        assert!(can_self_promote(
            &basic,
            &request(basic.id, RequestStatus::Approved)
        ));
        assert!(!can_self_promote(
            &basic,
            &request(basic.id, RequestStatus::Pending)
        ));
        assert!(!can_self_promote(
            &basic,
            &request(UserId::generate(), RequestStatus::Approved)
        ));

        let planner = identity(Role::Planner);
        let own = request(planner.id, RequestStatus::Approved);
        assert!(!can_self_promote(&planner, &own));
        assert!(permits(&planner, Capability::MaterializeRequest(&own)));
    }

    #[test]
    fn test_review_denied_for_basic_with_reason() {
        let basic = identity(Role::Basic);
        let err = authorize(&basic, Capability::ReviewRequests).unwrap_err();
        assert_eq!(
            err.to_string(),
            "basic user is not allowed to review session requests"
        );
    }

    #[test]
    fn test_request_visible_to_requester_and_reviewers_only() {
        let requester = identity(Role::Basic);
        let r = request(requester.id, RequestStatus::Pending);
        assert!(permits(&requester, Capability::ViewRequest(&r)));
        assert!(!permits(&identity(Role::Basic), Capability::ViewRequest(&r)));
        assert!(permits(&identity(Role::Planner), Capability::ViewRequest(&r)));
    }

    #[test]
    fn test_comment_changes_are_author_only() {
        let author = identity(Role::Basic);
        let at = Utc::now();
        let comment = Comment {
            id: CommentId::generate(),
            session_id: SessionId::generate(),
            author_id: author.id,
            content: "Great talk".to_owned(),
            created_at: at,
            updated_at: at,
        };
        assert!(permits(&author, Capability::ModifyComment(&comment)));
        // Role elevation does not extend to other people's comments
        assert!(!permits(
            &identity(Role::Admin),
            Capability::ModifyComment(&comment)
        ));
    }

    #[test]
    fn test_only_admins_manage_users() {
        assert!(permits(&identity(Role::Admin), Capability::ManageUsers));
        assert!(!permits(&identity(Role::Planner), Capability::ManageUsers));
        assert!(!permits(&identity(Role::Basic), Capability::ManageUsers));
    }
}
