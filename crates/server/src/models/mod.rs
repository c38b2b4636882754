//! Server-side models: cookie session contents and API views.

pub mod session;
pub mod views;

pub use session::{CurrentUser, keys as session_keys};
pub use views::{
    CommentView, InterestState, InterestView, PersonRef, RequestView, SessionDetail, SessionView,
};
