//! Session drafts and edits.
//!
//! [`DraftInput`] is what a client submits when scheduling a session (either
//! directly or from an approved request). [`DraftInput::validate`] turns it
//! into a [`SessionDraft`] the stores can write without further checks.
//!
//! [`SessionPatch`] covers later edits, including the rule that a session
//! which has already happened keeps its title and time.

use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Session;
use crate::types::{TagId, UserId, Visibility};

/// Errors from validating a draft or the scheduling part of a patch.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("title cannot be empty")]
    EmptyTitle,
    #[error("a date and time are required")]
    MissingDateTime,
    #[error("invalid date-time {0:?}, expected RFC 3339")]
    InvalidDateTime(String),
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("both a date and a time are required")]
    PartialDateTime,
}

/// Errors from applying a [`SessionPatch`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("{field} cannot be changed after the session has taken place")]
    Frozen { field: &'static str },
    #[error(transparent)]
    Invalid(#[from] DraftError),
}

/// Unvalidated scheduling details as submitted by a client.
///
/// The instant is given either as `datetime` (RFC 3339) or as `date` plus
/// `time`, the latter read as UTC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftInput {
    pub title: String,
    pub description: String,
    pub datetime: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub visibility: Visibility,
    pub presentation_url: Option<String>,
    pub recording_url: Option<String>,
    pub tag_ids: Vec<TagId>,
    pub guest_ids: Vec<UserId>,
}

/// A validated session ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub title: String,
    pub description: String,
    pub datetime: DateTime<Utc>,
    pub visibility: Visibility,
    pub presentation_url: Option<String>,
    pub recording_url: Option<String>,
    /// Distinct, in submission order.
    pub tag_ids: Vec<TagId>,
    /// Distinct, and always empty for public sessions.
    pub guest_ids: Vec<UserId>,
}

impl DraftInput {
    /// Validate and normalize.
    ///
    /// # Errors
    ///
    /// Returns [`DraftError`] for a blank title or a missing or unparseable
    /// date-time.
    pub fn validate(self) -> Result<SessionDraft, DraftError> {
        let title = required_title(&self.title)?;
        let datetime = parse_instant(
            self.datetime.as_deref(),
            self.date.as_deref(),
            self.time.as_deref(),
        )?
        .ok_or(DraftError::MissingDateTime)?;

        let guest_ids = match self.visibility {
            Visibility::Private => distinct(self.guest_ids),
            Visibility::Public => Vec::new(),
        };

        Ok(SessionDraft {
            title,
            description: self.description.trim().to_owned(),
            datetime,
            visibility: self.visibility,
            presentation_url: optional_text(self.presentation_url.as_deref()),
            recording_url: optional_text(self.recording_url.as_deref()),
            tag_ids: distinct(self.tag_ids),
            guest_ids,
        })
    }
}

/// A partial update to a session.
///
/// Absent fields are left alone. For the two URL fields an empty string
/// clears the stored value. `tag_ids` and `guest_ids`, when present, replace
/// the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub datetime: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub visibility: Option<Visibility>,
    pub presentation_url: Option<String>,
    pub recording_url: Option<String>,
    pub tag_ids: Option<Vec<TagId>>,
    pub guest_ids: Option<Vec<UserId>>,
}

/// The result of applying a patch: the session row to write and any
/// association sets to replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEdit {
    pub session: Session,
    pub tag_ids: Option<Vec<TagId>>,
    pub guest_ids: Option<Vec<UserId>>,
}

impl SessionPatch {
    /// Whether the patch touches anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.datetime.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.visibility.is_none()
            && self.presentation_url.is_none()
            && self.recording_url.is_none()
            && self.tag_ids.is_none()
            && self.guest_ids.is_none()
    }

    /// Apply to `current` as of `now`.
    ///
    /// Resubmitting the unchanged title or time of a past session is accepted,
    /// so clients can send whole forms back.
    ///
    /// # Errors
    ///
    /// [`EditError::Frozen`] when a past session's title or time would change,
    /// [`EditError::Invalid`] for a blank title or bad date-time.
    pub fn apply(self, current: &Session, now: DateTime<Utc>) -> Result<SessionEdit, EditError> {
        let frozen = current.is_past(now);
        let mut session = current.clone();

        if let Some(title) = self.title.as_deref() {
            let title = required_title(title)?;
            if frozen && title != current.title {
                return Err(EditError::Frozen { field: "title" });
            }
            session.title = title;
        }

        if let Some(datetime) = parse_instant(
            self.datetime.as_deref(),
            self.date.as_deref(),
            self.time.as_deref(),
        )? {
            if frozen && datetime != current.datetime {
                return Err(EditError::Frozen { field: "datetime" });
            }
            session.datetime = datetime;
        }

        if let Some(description) = self.description {
            session.description = description.trim().to_owned();
        }
        if let Some(url) = self.presentation_url {
            session.presentation_url = optional_text(Some(&url));
        }
        if let Some(url) = self.recording_url {
            session.recording_url = optional_text(Some(&url));
        }
        if let Some(visibility) = self.visibility {
            session.visibility = visibility;
        }

        let guest_ids = match session.visibility {
            // Public sessions have no guest list; clear any left from before
            Visibility::Public if current.visibility == Visibility::Private => Some(Vec::new()),
            Visibility::Public => None,
            Visibility::Private => self.guest_ids.map(distinct),
        };

        Ok(SessionEdit {
            session,
            tag_ids: self.tag_ids.map(distinct),
            guest_ids,
        })
    }
}

fn required_title(raw: &str) -> Result<String, DraftError> {
    let title = raw.trim();
    if title.is_empty() {
        Err(DraftError::EmptyTitle)
    } else {
        Ok(title.to_owned())
    }
}

fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Read an instant from either an RFC 3339 string or a UTC date plus time.
/// `Ok(None)` when nothing was supplied.
fn parse_instant(
    datetime: Option<&str>,
    date: Option<&str>,
    time: Option<&str>,
) -> Result<Option<DateTime<Utc>>, DraftError> {
    let datetime = datetime.map(str::trim).filter(|s| !s.is_empty());
    let date = date.map(str::trim).filter(|s| !s.is_empty());
    let time = time.map(str::trim).filter(|s| !s.is_empty());

    if let Some(raw) = datetime {
        return DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| DraftError::InvalidDateTime(raw.to_owned()));
    }

    match (date, time) {
        (None, None) => Ok(None),
        (Some(date), Some(time)) => {
            let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| DraftError::InvalidDate(date.to_owned()))?;
            let clock = NaiveTime::parse_from_str(time, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
                .map_err(|_| DraftError::InvalidTime(time.to_owned()))?;
            Ok(Some(day.and_time(clock).and_utc()))
        }
        _ => Err(DraftError::PartialDateTime),
    }
}

/// Drop repeated ids, keeping first-seen order.
#[must_use]
pub fn distinct<T: Eq + Hash + Copy>(ids: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::types::SessionId;

    fn input() -> DraftInput {
        DraftInput {
            title: "  Intro to Rust ".to_owned(),
            description: "Ownership and borrowing".to_owned(),
            date: Some("2026-03-05".to_owned()),
            time: Some("14:30".to_owned()),
            ..DraftInput::default()
        }
    }

    fn session_at(datetime: DateTime<Utc>) -> Session {
        Session {
            id: SessionId::generate(),
            title: "Intro to Rust".to_owned(),
            description: String::new(),
            datetime,
            presentation_url: None,
            recording_url: None,
            visibility: Visibility::Private,
            owner_id: UserId::generate(),
            created_at: datetime,
            updated_at: datetime,
        }
    }

    #[test]
    fn test_date_and_time_are_utc() {
        let draft = input().validate().unwrap();
        assert_eq!(draft.title, "Intro to Rust");
        assert_eq!(
            draft.datetime,
            Utc.with_ymd_and_hms(2026, 3, 5, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_rfc3339_takes_precedence() {
        let draft = DraftInput {
            datetime: Some("2026-03-05T10:00:00+02:00".to_owned()),
            ..input()
        }
        .validate()
        .unwrap();
        assert_eq!(
            draft.datetime,
            Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_and_malformed_datetimes() {
        let none = DraftInput {
            date: None,
            time: None,
            ..input()
        };
        assert_eq!(none.validate(), Err(DraftError::MissingDateTime));

        let half = DraftInput {
            time: None,
            ..input()
        };
        assert_eq!(half.validate(), Err(DraftError::PartialDateTime));

        let bad_date = DraftInput {
            date: Some("05/03/2026".to_owned()),
            ..input()
        };
        assert!(matches!(bad_date.validate(), Err(DraftError::InvalidDate(_))));

        let bad_time = DraftInput {
            time: Some("25:00".to_owned()),
            ..input()
        };
        assert!(matches!(bad_time.validate(), Err(DraftError::InvalidTime(_))));

        let bad_rfc = DraftInput {
            datetime: Some("tomorrow".to_owned()),
            ..input()
        };
        assert!(matches!(
            bad_rfc.validate(),
            Err(DraftError::InvalidDateTime(_))
        ));
    }

    #[test]
    fn test_blank_title() {
        let draft = DraftInput {
            title: " \t".to_owned(),
            ..input()
        };
        assert_eq!(draft.validate(), Err(DraftError::EmptyTitle));
    }

    #[test]
    fn test_guests_only_for_private_and_deduplicated() {
        let a = UserId::generate();
        let b = UserId::generate();
        let tag = TagId::generate();

        let public = DraftInput {
            guest_ids: vec![a, b],
            tag_ids: vec![tag, tag],
            ..input()
        }
        .validate()
        .unwrap();
        assert!(public.guest_ids.is_empty());
        assert_eq!(public.tag_ids, vec![tag]);

        let private = DraftInput {
            visibility: Visibility::Private,
            guest_ids: vec![a, b, a],
            ..input()
        }
        .validate()
        .unwrap();
        assert_eq!(private.guest_ids, vec![a, b]);
    }

    #[test]
    fn test_blank_urls_become_none() {
        let draft = DraftInput {
            presentation_url: Some("  ".to_owned()),
            recording_url: Some(" https://example.com/rec ".to_owned()),
            ..input()
        }
        .validate()
        .unwrap();
        assert_eq!(draft.presentation_url, None);
        assert_eq!(draft.recording_url.as_deref(), Some("https://example.com/rec"));
    }

    #[test]
    fn test_past_session_freezes_title_and_time() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let past = session_at(now - Duration::days(1));

        let retitle = SessionPatch {
            title: Some("Advanced Rust".to_owned()),
            ..SessionPatch::default()
        };
        assert_eq!(
            retitle.apply(&past, now),
            Err(EditError::Frozen { field: "title" })
        );

        let reschedule = SessionPatch {
            datetime: Some("2026-07-01T10:00:00Z".to_owned()),
            ..SessionPatch::default()
        };
        assert_eq!(
            reschedule.apply(&past, now),
            Err(EditError::Frozen { field: "datetime" })
        );
    }

    #[test]
    fn test_past_session_accepts_mutable_fields() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let past = session_at(now);

        let edit = SessionPatch {
            title: Some(past.title.clone()),
            description: Some("Slides attached".to_owned()),
            recording_url: Some("https://example.com/rec".to_owned()),
            visibility: Some(Visibility::Public),
            ..SessionPatch::default()
        }
        .apply(&past, now)
        .unwrap();

        assert_eq!(edit.session.description, "Slides attached");
        assert_eq!(edit.session.visibility, Visibility::Public);
        // Going public drops the guest list
        assert_eq!(edit.guest_ids, Some(Vec::new()));
    }

    #[test]
    fn test_future_session_can_be_rescheduled() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let upcoming = session_at(now + Duration::hours(2));
        let guest = UserId::generate();

        let edit = SessionPatch {
            title: Some("Rust in production".to_owned()),
            date: Some("2026-06-10".to_owned()),
            time: Some("09:00".to_owned()),
            guest_ids: Some(vec![guest, guest]),
            ..SessionPatch::default()
        }
        .apply(&upcoming, now)
        .unwrap();

        assert_eq!(edit.session.title, "Rust in production");
        assert_eq!(
            edit.session.datetime,
            Utc.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).unwrap()
        );
        assert_eq!(edit.guest_ids, Some(vec![guest]));
        assert_eq!(edit.tag_ids, None);
    }

    #[test]
    fn test_empty_patch() {
        assert!(SessionPatch::default().is_empty());
        assert!(
            !SessionPatch {
                tag_ids: Some(Vec::new()),
                ..SessionPatch::default()
            }
            .is_empty()
        );
    }
}
