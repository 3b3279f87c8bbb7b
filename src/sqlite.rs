//! SQLite implementation of [`TaskStore`].

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::store::{StatusUpdate, StoreDump, StoreError, TaskStatus, TaskStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS task_definition (
    task_id TEXT PRIMARY KEY,
    task_data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_status (
    task_id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending',
    FOREIGN KEY(task_id) REFERENCES task_definition(task_id)
);

CREATE TABLE IF NOT EXISTS task_result (
    task_id TEXT PRIMARY KEY,
    result TEXT NOT NULL,
    FOREIGN KEY(task_id) REFERENCES task_definition(task_id)
);

CREATE TABLE IF NOT EXISTS task_error (
    task_id TEXT PRIMARY KEY,
    error TEXT NOT NULL,
    FOREIGN KEY(task_id) REFERENCES task_definition(task_id)
);

CREATE INDEX IF NOT EXISTS idx_task_status_status ON task_status(status);
"#;

/// SQLite-backed task store.
///
/// Definitions and results are stored as JSON text; encoding and decoding
/// happen only at this boundary. Errors are stored as plain text.
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Create a store on an existing connection pool.
    ///
    /// Call [`run_migrations`](Self::run_migrations) before first use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) a store backed by the database file at
    /// `path`, with migrations applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Close the underlying connection pool, releasing the database file.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations to create the task tables.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StoreError::StorageError(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn store_tasks(&self, tasks: &[(String, serde_json::Value)]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        for (id, definition) in tasks {
            let definition_str = serde_json::to_string(definition)
                .map_err(|e| StoreError::SerializationError(e.to_string()))?;

            sqlx::query("INSERT OR IGNORE INTO task_definition (task_id, task_data) VALUES (?, ?)")
                .bind(id)
                .bind(definition_str)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;

            sqlx::query("INSERT OR IGNORE INTO task_status (task_id, status) VALUES (?, 'pending')")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    async fn update_task_statuses(&self, updates: &[StatusUpdate]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        for update in updates {
            sqlx::query("UPDATE task_status SET status = ? WHERE task_id = ?")
                .bind(update.status.as_str())
                .bind(&update.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;

            if let Some(result) = &update.result {
                let result_str = serde_json::to_string(result)
                    .map_err(|e| StoreError::SerializationError(e.to_string()))?;

                sqlx::query("INSERT OR REPLACE INTO task_result (task_id, result) VALUES (?, ?)")
                    .bind(&update.id)
                    .bind(result_str)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::StorageError(e.to_string()))?;

                sqlx::query("DELETE FROM task_error WHERE task_id = ?")
                    .bind(&update.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::StorageError(e.to_string()))?;
            }

            if let Some(error) = &update.error {
                sqlx::query("INSERT OR REPLACE INTO task_error (task_id, error) VALUES (?, ?)")
                    .bind(&update.id)
                    .bind(error)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::StorageError(e.to_string()))?;

                sqlx::query("DELETE FROM task_result WHERE task_id = ?")
                    .bind(&update.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::StorageError(e.to_string()))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    async fn get_task_status(&self, id: &str) -> Result<Option<TaskStatus>, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM task_status WHERE task_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;

        status.map(|s| s.parse()).transpose()
    }

    async fn get_pending_tasks(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar("SELECT task_id FROM task_status WHERE status = 'pending'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    async fn get_completed_tasks(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar("SELECT task_id FROM task_status WHERE status = 'completed'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    async fn get_failed_tasks(&self) -> Result<Vec<(String, String)>, StoreError> {
        sqlx::query_as(
            r#"
            SELECT ts.task_id, te.error
            FROM task_status ts
            JOIN task_error te ON ts.task_id = te.task_id
            WHERE ts.status = 'failed'
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    async fn get_task_result(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let result: Option<String> = sqlx::query_scalar(
            r#"
            SELECT tr.result
            FROM task_result tr
            JOIN task_status ts ON tr.task_id = ts.task_id
            WHERE tr.task_id = ? AND ts.status = 'completed'
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))?;

        result
            .map(|r| {
                serde_json::from_str(&r)
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))
            })
            .transpose()
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        for table in ["task_status", "task_result", "task_error", "task_definition"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    async fn clear_tasks(&self, ids: &[String]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        for id in ids {
            for table in ["task_status", "task_result", "task_error", "task_definition"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE task_id = ?"))
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::StorageError(e.to_string()))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    async fn dump_all(&self) -> Result<StoreDump, StoreError> {
        let mut dump = StoreDump::default();

        let definitions: Vec<(String, String)> =
            sqlx::query_as("SELECT task_id, task_data FROM task_definition")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;
        for (id, data) in definitions {
            let value = serde_json::from_str(&data)
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
            dump.task_definitions.insert(id, value);
        }

        let statuses: Vec<(String, String)> =
            sqlx::query_as("SELECT task_id, status FROM task_status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;
        for (id, status) in statuses {
            dump.task_statuses.insert(id, status.parse()?);
        }

        let results: Vec<(String, String)> =
            sqlx::query_as("SELECT task_id, result FROM task_result")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;
        for (id, result) in results {
            let value = serde_json::from_str(&result)
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
            dump.task_results.insert(id, value);
        }

        let errors: Vec<(String, String)> =
            sqlx::query_as("SELECT task_id, error FROM task_error")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?;
        for (id, error) in errors {
            dump.task_errors.insert(id, error);
        }

        Ok(dump)
    }
}
