//! User management commands.
//!
//! Role changes normally happen in the API, but the first admin has to come
//! from somewhere: sign in once, then promote the account here.
//!
//! # Usage
//!
//! ```bash
//! # Promote a user who has signed in at least once
//! ks-cli user set-role -e someone@example.com -r admin
//!
//! # List users, optionally by role
//! ks-cli user list --role planner
//! ```

use sqlx::PgPool;
use thiserror::Error;

use knowledge_share_core::{Email, Role};
use knowledge_share_server::db::{ProfileFilter, ProfileRepository, RepositoryError};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Missing environment variable: KS_DATABASE_URL (or DATABASE_URL)")]
    MissingDatabaseUrl,

    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Invalid role: {0}. Valid roles: basic, planner, admin")]
    InvalidRole(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("No user with email {0}; they must sign in once first")]
    UnknownUser(String),
}

async fn connect() -> Result<PgPool, UserError> {
    let database_url = super::database_url().ok_or(UserError::MissingDatabaseUrl)?;
    tracing::info!("Connecting to database...");
    Ok(PgPool::connect(&database_url).await?)
}

fn parse_role(role: &str) -> Result<Role, UserError> {
    role.parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))
}

/// Change the role of the user with `email`.
///
/// # Errors
///
/// Returns an error if the arguments are invalid, the user is unknown, or
/// the database fails.
pub async fn set_role(email: &str, role: &str) -> Result<(), UserError> {
    let role = parse_role(role)?;
    let email = Email::parse(email).map_err(|_| UserError::InvalidEmail(email.to_owned()))?;

    let pool = connect().await?;
    let profiles = ProfileRepository::new(&pool);

    let profile = profiles
        .get_by_email(&email)
        .await?
        .ok_or_else(|| UserError::UnknownUser(email.to_string()))?;

    if profile.role == role {
        tracing::info!("{} is already {}", email, role);
        return Ok(());
    }

    let updated = profiles.update_role(profile.id, role).await?;
    tracing::info!(
        "Role updated. ID: {}, Email: {}, Role: {} -> {}",
        updated.id,
        updated.email,
        profile.role,
        updated.role
    );
    Ok(())
}

/// Print users, optionally only those with `role`.
///
/// # Errors
///
/// Returns an error if the role is invalid or the database fails.
pub async fn list(role: Option<&str>) -> Result<(), UserError> {
    let role = role.map(parse_role).transpose()?;

    let pool = connect().await?;
    let profiles = ProfileRepository::new(&pool)
        .list(&ProfileFilter { role, search: None })
        .await?;

    #[allow(clippy::print_stdout)]
    {
        for profile in &profiles {
            println!(
                "{}  {:<8}  {:<32}  {}",
                profile.id, profile.role, profile.email, profile.display_name
            );
        }
        println!("{} user(s)", profiles.len());
    }
    Ok(())
}
