//! Subcommand implementations.

pub mod migrate;
pub mod user;

/// Database URL for CLI commands: `KS_DATABASE_URL`, then `DATABASE_URL`.
fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("KS_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}
