//! Knowledge Share Core - types and rules shared by every component.
//!
//! This crate is used by:
//! - `server` - JSON API and engine services
//! - `cli` - Migrations and user administration
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP. Every decision here takes the acting identity and the rows
//! involved as explicit arguments.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, email, and the role/visibility/status enums
//! - [`models`] - Profiles, requests, sessions, tags, interests, comments
//! - [`policy`] - Who may view, edit, delete, review, or materialize
//! - [`lifecycle`] - The session-request state machine
//! - [`schedule`] - Session drafts and the edit rules for past sessions

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod lifecycle;
pub mod models;
pub mod policy;
pub mod schedule;
pub mod types;

pub use lifecycle::{Review, TransitionError};
pub use models::*;
pub use policy::{AccessDenied, Capability};
pub use schedule::{DraftError, DraftInput, EditError, SessionDraft, SessionEdit, SessionPatch};
pub use types::*;
