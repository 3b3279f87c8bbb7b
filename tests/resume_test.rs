//! End-to-end resume tests against a file-backed store.

#![cfg(feature = "sqlite")]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use foreman::{ExecutorBuilder, SqliteTaskStore, Task, TaskStatus, TaskStore};
use serde_json::json;

// Task that fails while the shared flag is set and succeeds afterwards.
struct FlakyTask {
    id: String,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Task for FlakyTask {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn invoke(&self) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("boom");
        }
        Ok(json!({"id": self.id}))
    }
}

fn tasks(failing: &Arc<AtomicBool>, calls: &Arc<AtomicUsize>) -> Vec<Arc<dyn Task>> {
    (1..=3)
        .map(|i| {
            Arc::new(FlakyTask {
                id: format!("t{i}"),
                failing: if i == 3 {
                    failing.clone()
                } else {
                    Arc::new(AtomicBool::new(false))
                },
                calls: calls.clone(),
            }) as Arc<dyn Task>
        })
        .collect()
}

fn definitions() -> Vec<(String, serde_json::Value)> {
    (1..=3).map(|i| (format!("t{i}"), json!({"n": i}))).collect()
}

#[tokio::test]
async fn test_resume_across_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tasks.db");

    let failing = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(AtomicUsize::new(0));

    // First run: t1 and t2 complete, t3 fails.
    let store = SqliteTaskStore::open(&db_path).await.unwrap();
    store.store_tasks(&definitions()).await.unwrap();

    let executor = ExecutorBuilder::new(store)
        .tasks(tasks(&failing, &calls))
        .max_concurrency(2)
        .build();
    executor.run().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    executor.store().close().await;

    // Reopen the same file: terminal state survived, so a new run has
    // nothing to dispatch.
    let store = SqliteTaskStore::open(&db_path).await.unwrap();
    assert!(store.get_pending_tasks().await.unwrap().is_empty());
    assert_eq!(
        store.get_failed_tasks().await.unwrap(),
        vec![("t3".to_string(), "boom".to_string())]
    );
    assert_eq!(
        store.get_task_result("t1").await.unwrap(),
        Some(json!({"id": "t1"}))
    );

    let executor = ExecutorBuilder::new(store)
        .tasks(tasks(&failing, &calls))
        .max_concurrency(2)
        .build();
    executor.run().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cleared_task_runs_again_after_resume() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tasks.db");

    let failing = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(AtomicUsize::new(0));

    let store = SqliteTaskStore::open(&db_path).await.unwrap();
    store.store_tasks(&definitions()).await.unwrap();

    let executor = ExecutorBuilder::new(store)
        .tasks(tasks(&failing, &calls))
        .build();
    executor.run().await.unwrap();
    executor.store().close().await;

    // Explicitly reset the failed task, then let it succeed on the rerun.
    let store = SqliteTaskStore::open(&db_path).await.unwrap();
    store.clear_tasks(&["t3".to_string()]).await.unwrap();
    store
        .store_tasks(&[("t3".to_string(), json!({"n": 3}))])
        .await
        .unwrap();
    assert_eq!(
        store.get_task_status("t3").await.unwrap(),
        Some(TaskStatus::Pending)
    );

    failing.store(false, Ordering::SeqCst);
    let executor = ExecutorBuilder::new(store)
        .tasks(tasks(&failing, &calls))
        .build();
    executor.run().await.unwrap();

    // Only the reset task ran again.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let summary = executor.status_summary().await.unwrap();
    assert_eq!((summary.pending, summary.completed, summary.failed), (0, 3, 0));
    assert_eq!(
        executor.store().get_task_result("t3").await.unwrap(),
        Some(json!({"id": "t3"}))
    );
}
