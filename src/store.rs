//! Task storage trait and types.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a stored task.
///
/// `Pending` is the initial status; the other two are terminal until the
/// record is explicitly reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    /// The status as stored in the persistence layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::DeserializationError(format!(
                "unknown task status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a batched status update.
///
/// Setting `result` clears any stored error for the id, and setting `error`
/// clears any stored result, so a record never carries both. Omitting both
/// leaves both fields untouched.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub id: String,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StatusUpdate {
    /// An update that marks a task completed with its result.
    pub fn completed(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    /// An update that marks a task failed with an error message.
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Full export of a store's contents, keyed by task id per collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreDump {
    pub task_definitions: HashMap<String, serde_json::Value>,
    pub task_statuses: HashMap<String, TaskStatus>,
    pub task_results: HashMap<String, serde_json::Value>,
    pub task_errors: HashMap<String, String>,
}

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage error: {0}")]
    StorageError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),
}

/// Trait for task state storage backends.
///
/// Every operation is transactional: it either fully applies or leaves the
/// underlying data untouched, and concurrent callers observe a serialized
/// order of calls. Storage faults are not recovered internally; they
/// surface as [`StoreError`] to the caller.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert task definitions with status `pending`, skipping ids that
    /// already have a record. Idempotent; never overwrites an existing
    /// definition, status, result, or error.
    async fn store_tasks(&self, tasks: &[(String, serde_json::Value)]) -> Result<(), StoreError>;

    /// Apply a batch of status updates atomically.
    async fn update_task_statuses(&self, updates: &[StatusUpdate]) -> Result<(), StoreError>;

    /// The current status of a task, or `None` for an unknown id.
    async fn get_task_status(&self, id: &str) -> Result<Option<TaskStatus>, StoreError>;

    /// Ids with status `pending`, as a snapshot at call time.
    ///
    /// Failed tasks are deliberately excluded: re-running them requires an
    /// explicit reset via [`clear_tasks`](Self::clear_tasks) followed by
    /// [`store_tasks`](Self::store_tasks).
    async fn get_pending_tasks(&self) -> Result<Vec<String>, StoreError>;

    /// Ids with status `completed`, as a snapshot at call time.
    async fn get_completed_tasks(&self) -> Result<Vec<String>, StoreError>;

    /// `(id, error)` pairs for tasks with status `failed` and a recorded
    /// error. Snapshot at call time.
    async fn get_failed_tasks(&self) -> Result<Vec<(String, String)>, StoreError>;

    /// The stored result for a completed task. `None` if the id is unknown
    /// or the task is not completed.
    async fn get_task_result(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Remove all records. Irreversible.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Remove the records for the given ids, including definition, status,
    /// result, and error. Unknown ids are ignored.
    async fn clear_tasks(&self, ids: &[String]) -> Result<(), StoreError>;

    /// Export the full store contents as one structured snapshot.
    async fn dump_all(&self) -> Result<StoreDump, StoreError>;
}
