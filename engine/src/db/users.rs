//! Users repository
//!
//! One row per identity in `users`, facts in `key_facts`. Lists are stored as
//! JSON text; saves rewrite the row and the user's facts in one transaction.

use super::SnapshotStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::{EngineError, FactTable, SaveReport, SessionSnapshot, UserIdentity};
use sqlx::{Row, SqlitePool};

const NO_USER_DATA: &str = "No user data to save";
const USER_NOT_FOUND: &str = "User not found";

/// Snapshot repository over SQLite
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn user_id(&self, identity: &UserIdentity) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM users WHERE first_name = ? AND last_name = ?")
            .bind(&identity.first_name)
            .bind(&identity.last_name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up user")?;

        Ok(row.map(|r| r.get("id")))
    }

    /// Load the full snapshot for an identity
    pub async fn load(&self, identity: &UserIdentity) -> Result<Option<SessionSnapshot>> {
        let row = sqlx::query(
            "SELECT id, messages, responses, summary, meal_plan FROM users WHERE first_name = ? AND last_name = ?",
        )
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user_id: i64 = row.get("id");
        let messages: Vec<String> = serde_json::from_str(row.get::<&str, _>("messages"))
            .context("Stored messages are not a JSON string array")?;
        let responses: Vec<String> = serde_json::from_str(row.get::<&str, _>("responses"))
            .context("Stored responses are not a JSON string array")?;

        Ok(Some(SessionSnapshot {
            messages,
            responses,
            summary: row.get("summary"),
            key_facts: self.load_facts(user_id).await?,
            meal_plan: row.get("meal_plan"),
        }))
    }

    async fn load_facts(&self, user_id: i64) -> Result<FactTable> {
        let rows = sqlx::query("SELECT fact_key, fact_value FROM key_facts WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch key facts")?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("fact_key"), r.get("fact_value")))
            .collect())
    }

    /// Insert an empty row unless one exists, then return the stored snapshot
    pub async fn create(&self, identity: &UserIdentity) -> Result<SessionSnapshot> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT OR IGNORE INTO users (first_name, last_name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create user")?;

        if result.rows_affected() == 1 {
            tracing::info!("Created user {}", identity);
        }

        self.load(identity)
            .await?
            .context("User row missing right after insert")
    }

    /// Rewrite the stored snapshot and facts
    pub async fn save(
        &self,
        identity: &UserIdentity,
        snapshot: &SessionSnapshot,
    ) -> Result<SaveReport> {
        if snapshot.has_no_dialogue() {
            return Ok(SaveReport::rejected(NO_USER_DATA));
        }

        let Some(user_id) = self.user_id(identity).await? else {
            return Ok(SaveReport::rejected(USER_NOT_FOUND));
        };

        let now = chrono::Utc::now().timestamp();
        let messages = serde_json::to_string(&snapshot.messages)?;
        let responses = serde_json::to_string(&snapshot.responses)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin save transaction")?;

        sqlx::query(
            "UPDATE users SET messages = ?, responses = ?, summary = ?, meal_plan = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&messages)
        .bind(&responses)
        .bind(&snapshot.summary)
        .bind(&snapshot.meal_plan)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update user")?;

        sqlx::query("DELETE FROM key_facts WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear key facts")?;

        for (key, value) in &snapshot.key_facts {
            sqlx::query("INSERT INTO key_facts (user_id, fact_key, fact_value) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .context("Failed to insert key fact")?;
        }

        tx.commit().await.context("Failed to commit save")?;

        tracing::debug!(
            "Saved {} messages, {} responses, {} facts for {}",
            snapshot.messages.len(),
            snapshot.responses.len(),
            snapshot.key_facts.len(),
            identity
        );

        Ok(SaveReport::saved())
    }
}

fn db_error(e: anyhow::Error) -> EngineError {
    EngineError::Database(format!("{:#}", e))
}

#[async_trait]
impl SnapshotStore for UserRepository {
    async fn find_user(
        &self,
        identity: &UserIdentity,
    ) -> Result<Option<SessionSnapshot>, EngineError> {
        self.load(identity).await.map_err(db_error)
    }

    async fn create_user(&self, identity: &UserIdentity) -> Result<SessionSnapshot, EngineError> {
        self.create(identity).await.map_err(db_error)
    }

    async fn save_user(
        &self,
        identity: &UserIdentity,
        snapshot: &SessionSnapshot,
    ) -> Result<SaveReport, EngineError> {
        self.save(identity, snapshot).await.map_err(db_error)
    }
}
