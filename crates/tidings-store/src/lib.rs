//! PostgreSQL persistence for the Tidings notification feed.
//!
//! `PgMessageStore` is the message log and read-cursor store.
//! `PgDirectory` reads the collaborator tables (users, posts, comments,
//! votes, follows, collections, tags).

pub mod pg_directory;
pub mod pg_message_store;

use sqlx::PgPool;
use sqlx::migrate::MigrateError;

pub use pg_directory::PgDirectory;
pub use pg_message_store::PgMessageStore;

/// Applies the workspace migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
