//! Entity models shared by the engine and its stores.
//!
//! These mirror the stored rows field-for-field (with Rust-side names where the
//! column name is ambiguous, e.g. `owner_id` for `sessions.created_by`).

pub mod engagement;
pub mod profile;
pub mod request;
pub mod session;

pub use engagement::{Comment, SessionInterest};
pub use profile::{Identity, Profile};
pub use request::SessionRequest;
pub use session::{Session, SessionGuest, Tag};
