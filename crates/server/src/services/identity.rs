//! Identity resolution.
//!
//! The identity provider signs a small JSON assertion with a secret shared
//! with this server. The signature header is
//! `v1=<hex hmac-sha256("v1:{issued_at}:{body}")>`, where `body` is the raw
//! request body. A verified assertion upserts the user's profile; afterwards
//! each request resolves the identity from the stored profile so that role
//! changes take effect immediately.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use knowledge_share_core::{Email, EmailError, Identity, Profile, UserId};

use super::Bounded;
use crate::config::IdentityConfig;
use crate::db::{ProfileClaims, Store};
use crate::error::{AppError, set_sentry_user};

/// Header carrying the assertion signature.
pub const SIGNATURE_HEADER: &str = "x-identity-signature";

/// Accepted clock skew for assertions issued slightly in the future.
const MAX_SKEW_SECS: i64 = 30;

type HmacSha256 = Hmac<Sha256>;

/// Claims asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    /// Unix seconds.
    pub issued_at: i64,
}

/// Why an assertion was refused.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing identity signature")]
    MissingSignature,

    #[error("malformed identity signature")]
    MalformedSignature,

    #[error("identity signature does not match")]
    BadSignature,

    #[error("identity assertion is {age_secs}s old")]
    Stale { age_secs: i64 },

    #[error("identity assertion is not valid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidPayload(_) | IdentityError::InvalidEmail(_) => {
                Self::Validation(e.to_string())
            }
            _ => Self::Unauthenticated(e.to_string()),
        }
    }
}

fn mac_for(secret: &SecretString, issued_at: i64, body: &[u8]) -> Result<HmacSha256, IdentityError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| IdentityError::MalformedSignature)?;
    mac.update(format!("v1:{issued_at}:").as_bytes());
    mac.update(body);
    Ok(mac)
}

/// Signature header value for `body`. Used by the identity provider side and
/// by tests.
///
/// # Errors
///
/// Returns `IdentityError::InvalidPayload` if `body` is not an assertion.
pub fn sign_assertion(secret: &SecretString, body: &[u8]) -> Result<String, IdentityError> {
    let assertion: Assertion = serde_json::from_slice(body)?;
    let mac = mac_for(secret, assertion.issued_at, body)?;
    Ok(format!("v1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check signature and freshness, then parse the assertion.
///
/// # Errors
///
/// Returns an [`IdentityError`] describing the first check that failed.
pub fn verify_assertion(
    config: &IdentityConfig,
    signature: Option<&str>,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<Assertion, IdentityError> {
    let signature = signature.ok_or(IdentityError::MissingSignature)?;
    let provided = signature
        .trim()
        .strip_prefix("v1=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or(IdentityError::MalformedSignature)?;

    let assertion: Assertion = serde_json::from_slice(body)?;

    // verify_slice compares in constant time
    mac_for(&config.secret, assertion.issued_at, body)?
        .verify_slice(&provided)
        .map_err(|_| IdentityError::BadSignature)?;

    let age_secs = now.timestamp() - assertion.issued_at;
    let max_age = ChronoDuration::from_std(config.max_age)
        .map_or(i64::MAX, |max_age| max_age.num_seconds());
    if age_secs > max_age || age_secs < -MAX_SKEW_SECS {
        return Err(IdentityError::Stale { age_secs });
    }

    Ok(assertion)
}

/// Signs users in and resolves the acting identity per request.
pub struct IdentityService<'a, S> {
    store: Bounded<'a, S>,
    config: &'a IdentityConfig,
}

impl<'a, S: Store> IdentityService<'a, S> {
    #[must_use]
    pub const fn new(store: Bounded<'a, S>, config: &'a IdentityConfig) -> Self {
        Self { store, config }
    }

    /// Verify an assertion and upsert the profile it names.
    ///
    /// New users start as `basic`. An existing profile keeps its role.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for a missing, bad or stale signature, `Validation`
    /// for an unreadable payload.
    #[instrument(skip(self, signature, body))]
    pub async fn sign_in(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Profile, AppError> {
        let assertion = verify_assertion(self.config, signature, body, Utc::now())
            .inspect_err(|e| warn!(error = %e, "Identity assertion refused"))?;

        let email = Email::parse(&assertion.email).map_err(IdentityError::from)?;
        let display_name = match assertion.display_name.trim() {
            "" => email.as_str().split('@').next().unwrap_or_default().to_owned(),
            name => name.to_owned(),
        };
        let claims = ProfileClaims {
            id: assertion.user_id,
            email,
            display_name,
        };

        let profile = self
            .store
            .call(self.store.store().upsert_profile(&claims))
            .await?;
        info!(user_id = %profile.id, role = %profile.role, "User signed in");
        Ok(profile)
    }

    /// Resolve the acting identity from the user id held in the cookie
    /// session.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` when there is no user id or its profile is gone.
    pub async fn resolve(&self, user_id: Option<UserId>) -> Result<Identity, AppError> {
        let user_id =
            user_id.ok_or_else(|| AppError::Unauthenticated("sign in required".to_owned()))?;

        let profile = self
            .store
            .call(self.store.store().get_profile(user_id))
            .await?
            .ok_or_else(|| {
                debug!(%user_id, "Session refers to a removed profile");
                AppError::Unauthenticated("account no longer exists".to_owned())
            })?;

        set_sentry_user(profile.id, Some(profile.email.as_str()));
        Ok(profile.identity())
    }
}
