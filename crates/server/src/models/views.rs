//! Read projections returned by the services and serialized by the API.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use knowledge_share_core::{Comment, Profile, Session, SessionRequest, Tag, UserId};

/// A user as shown next to something they did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonRef {
    pub id: UserId,
    pub display_name: String,
}

/// Display names for a batch of users.
#[derive(Debug, Default)]
pub(crate) struct Directory(HashMap<UserId, String>);

impl Directory {
    pub(crate) fn new(profiles: Vec<Profile>) -> Self {
        Self(
            profiles
                .into_iter()
                .map(|p| (p.id, p.display_name))
                .collect(),
        )
    }

    pub(crate) fn person(&self, id: UserId) -> PersonRef {
        PersonRef {
            id,
            display_name: self
                .0
                .get(&id)
                .cloned()
                .unwrap_or_else(|| "Former member".to_owned()),
        }
    }
}

/// A request with the people involved.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: SessionRequest,
    pub requester: PersonRef,
    pub reviewer: Option<PersonRef>,
}

/// A session with its owner, tags and guest list.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub owner: PersonRef,
    pub tags: Vec<Tag>,
    pub guest_ids: Vec<UserId>,
    pub is_past: bool,
}

/// A single session as seen by one viewer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub view: SessionView,
    pub interest_count: usize,
    pub interested: bool,
    pub can_edit: bool,
}

/// A comment with its author.
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: PersonRef,
    pub edited: bool,
}

impl CommentView {
    pub(crate) fn new(comment: Comment, author: PersonRef) -> Self {
        let edited = comment.is_edited();
        Self {
            comment,
            author,
            edited,
        }
    }
}

/// Someone who marked interest.
#[derive(Debug, Clone, Serialize)]
pub struct InterestView {
    pub user: PersonRef,
    pub created_at: DateTime<Utc>,
}

/// Result of a toggle: the viewer's new state and the session's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterestState {
    pub interested: bool,
    pub count: usize,
}
