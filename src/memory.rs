//! In-memory implementation of [`TaskStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::{StatusUpdate, StoreDump, StoreError, TaskStatus, TaskStore};

#[derive(Default)]
struct Inner {
    definitions: HashMap<String, serde_json::Value>,
    statuses: HashMap<String, TaskStatus>,
    results: HashMap<String, serde_json::Value>,
    errors: HashMap<String, String>,
}

/// Task store held entirely in process memory.
///
/// Useful for tests and for embedding callers that don't need durability.
/// A single coarse lock serializes all operations, which also makes each
/// call transactional.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
}

impl MemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a holder panicked; the maps are
        // still structurally intact, so keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn store_tasks(&self, tasks: &[(String, serde_json::Value)]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for (id, definition) in tasks {
            if !inner.definitions.contains_key(id) {
                inner.definitions.insert(id.clone(), definition.clone());
            }
            if !inner.statuses.contains_key(id) {
                inner.statuses.insert(id.clone(), TaskStatus::Pending);
            }
        }
        Ok(())
    }

    async fn update_task_statuses(&self, updates: &[StatusUpdate]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for update in updates {
            if let Some(status) = inner.statuses.get_mut(&update.id) {
                *status = update.status;
            }
            if let Some(result) = &update.result {
                inner.results.insert(update.id.clone(), result.clone());
                inner.errors.remove(&update.id);
            }
            if let Some(error) = &update.error {
                inner.errors.insert(update.id.clone(), error.clone());
                inner.results.remove(&update.id);
            }
        }
        Ok(())
    }

    async fn get_task_status(&self, id: &str) -> Result<Option<TaskStatus>, StoreError> {
        Ok(self.lock().statuses.get(id).copied())
    }

    async fn get_pending_tasks(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .statuses
            .iter()
            .filter(|(_, status)| **status == TaskStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn get_completed_tasks(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .statuses
            .iter()
            .filter(|(_, status)| **status == TaskStatus::Completed)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn get_failed_tasks(&self) -> Result<Vec<(String, String)>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .statuses
            .iter()
            .filter(|(_, status)| **status == TaskStatus::Failed)
            .filter_map(|(id, _)| {
                inner
                    .errors
                    .get(id)
                    .map(|error| (id.clone(), error.clone()))
            })
            .collect())
    }

    async fn get_task_result(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let inner = self.lock();
        if inner.statuses.get(id) != Some(&TaskStatus::Completed) {
            return Ok(None);
        }
        Ok(inner.results.get(id).cloned())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.definitions.clear();
        inner.statuses.clear();
        inner.results.clear();
        inner.errors.clear();
        Ok(())
    }

    async fn clear_tasks(&self, ids: &[String]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for id in ids {
            inner.definitions.remove(id);
            inner.statuses.remove(id);
            inner.results.remove(id);
            inner.errors.remove(id);
        }
        Ok(())
    }

    async fn dump_all(&self) -> Result<StoreDump, StoreError> {
        let inner = self.lock();
        Ok(StoreDump {
            task_definitions: inner.definitions.clone(),
            task_statuses: inner.statuses.clone(),
            task_results: inner.results.clone(),
            task_errors: inner.errors.clone(),
        })
    }
}
