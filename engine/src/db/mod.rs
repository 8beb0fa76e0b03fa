//! SQLite persistence for conversation snapshots
//!
//! `Database` owns the pool (WAL mode, migrations on open). `UserRepository`
//! implements the `SnapshotStore` trait the session layer depends on; the
//! session never sees SQL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::{EngineError, SaveReport, SessionSnapshot, UserIdentity};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod users;

pub use users::UserRepository;

/// Durable home of one snapshot per identity.
///
/// Identity is the name pair only; there is no password or token.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stored snapshot, or `None` for an unknown identity
    async fn find_user(&self, identity: &UserIdentity)
        -> Result<Option<SessionSnapshot>, EngineError>;

    /// Create an empty snapshot. Idempotent: an existing user's snapshot is returned.
    async fn create_user(&self, identity: &UserIdentity) -> Result<SessionSnapshot, EngineError>;

    /// Replace the stored snapshot.
    ///
    /// Rejections are reported in the `SaveReport`, not as errors:
    /// "No user data to save" when both lists are empty, "User not found"
    /// for an unknown identity. `Err` means the store itself failed.
    async fn save_user(
        &self,
        identity: &UserIdentity,
        snapshot: &SessionSnapshot,
    ) -> Result<SaveReport, EngineError>;
}

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and run migrations.
    ///
    /// WAL mode lets readers proceed while a snapshot is being written.
    /// SQLite replays a leftover WAL on open after an unclean shutdown.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Migrations are `IF NOT EXISTS` throughout and safe to rerun
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to execute migration 001_initial.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Repository over this pool
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Checkpoint the WAL into the main database file
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Flush the WAL and close every pooled connection
    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");

        self.flush_wal().await?;
        self.pool.close().await;

        info!("Database connection closed");
        Ok(())
    }
}
