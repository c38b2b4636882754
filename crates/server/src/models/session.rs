//! Types stored in the cookie session.
//!
//! Only the user id is kept. Role and profile are re-read from the store on
//! every request so a role change or account removal takes effect at once.

use serde::{Deserialize, Serialize};

use knowledge_share_core::UserId;

/// Session-stored reference to the signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
}

/// Session keys.
pub mod keys {
    /// Key for the signed-in user.
    pub const CURRENT_USER: &str = "current_user";
}
