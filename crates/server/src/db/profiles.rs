//! Profile repository.
//!
//! Profiles are keyed by the identity provider's user id. Rows are created on
//! first sign-in with role `basic`; only an admin (or `ks-cli`) changes roles.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use knowledge_share_core::{Email, Profile, Role, UserId};

use super::{ProfileClaims, ProfileFilter, RepositoryError, conflict_on_unique};

const PROFILE_COLUMNS: &str =
    "id, email, full_name, avatar_url, bio, role, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: UserId,
    email: String,
    full_name: Option<String>,
    avatar_url: Option<String>,
    bio: Option<String>,
    role: Role,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RepositoryError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        // Older rows may predate display names; fall back to the mailbox name
        let display_name = row
            .full_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| email.as_str().split('@').next().unwrap_or_default().to_owned());

        Ok(Self {
            id: row.id,
            email,
            display_name,
            avatar_url: row.avatar_url,
            bio: row.bio.unwrap_or_default(),
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for profile database operations.
pub struct ProfileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProfileRepository<'a> {
    /// Create a new profile repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a profile by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a profile by email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get every profile in `ids`. Missing ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[UserId]) -> Result<Vec<Profile>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Create the profile on first sign-in, or refresh the email.
    ///
    /// The role column is only written on insert; a stored name is kept
    /// unless blank.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another profile already uses the email.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(&self, claims: &ProfileClaims) -> Result<Profile, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            r"
            INSERT INTO profiles (id, email, full_name, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
               SET email = EXCLUDED.email,
                   full_name = COALESCE(NULLIF(profiles.full_name, ''), EXCLUDED.full_name),
                   updated_at = now()
            RETURNING {PROFILE_COLUMNS}
            "
        ))
        .bind(claims.id)
        .bind(&claims.email)
        .bind(&claims.display_name)
        .bind(Role::Basic)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "a profile with this email"))?;

        row.try_into()
    }

    /// List profiles, optionally filtered by role and a name/email search.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, RepositoryError> {
        let pattern = filter.search.as_deref().map(like_pattern);
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            r"
            SELECT {PROFILE_COLUMNS} FROM profiles
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::text IS NULL OR full_name ILIKE $2 OR email ILIKE $2)
            ORDER BY lower(coalesce(full_name, email)), email
            "
        ))
        .bind(filter.role)
        .bind(pattern)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Change a profile's display name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no profile has this id.
    pub async fn update_display_name(
        &self,
        id: UserId,
        display_name: &str,
    ) -> Result<Profile, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            r"
            UPDATE profiles SET full_name = $2, updated_at = now()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "
        ))
        .bind(id)
        .bind(display_name)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Change a profile's role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no profile has this id.
    pub async fn update_role(&self, id: UserId, role: Role) -> Result<Profile, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            r"
            UPDATE profiles SET role = $2, updated_at = now()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Delete a profile. Rows referencing it cascade per the schema.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no profile has this id.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// `%term%` with `LIKE` metacharacters escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
