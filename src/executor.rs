//! Concurrent executor that drives tasks against a persistent store.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::store::{StatusUpdate, StoreError, TaskStore};
use crate::task::Task;

/// Stop predicate re-evaluated by the driver after every harvested
/// completion.
pub type StopFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Error type for executor runs.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts of task statuses, read fresh from the store.
///
/// The `Display` impl renders the three-line summary:
///
/// ```text
/// Pending tasks: 0
/// Completed tasks: 5
/// Failed tasks: 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSummary {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

impl std::fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pending tasks: {}", self.pending)?;
        writeln!(f, "Completed tasks: {}", self.completed)?;
        write!(f, "Failed tasks: {}", self.failed)
    }
}

type WorkerOutput = (String, anyhow::Result<serde_json::Value>);

/// An executor that runs a collection of tasks against a store.
///
/// The store decides which of the supplied tasks still need to run: only
/// ids the store reports as pending are dispatched, so an interrupted or
/// repeated run resumes without redoing completed work. Outcomes are
/// written back one at a time as each invocation finishes.
pub struct Executor<S> {
    store: S,
    tasks: Vec<Arc<dyn Task>>,
    max_concurrency: usize,
    stop_when: Option<StopFn>,
}

impl<S: TaskStore> Executor<S> {
    /// The store this executor reads from and writes to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run all still-pending tasks to completion or until the stop
    /// predicate halts the run, then print a status summary read fresh
    /// from the store.
    ///
    /// Task faults are recorded per task and never abort the run; store
    /// faults propagate immediately and no summary is printed.
    pub async fn run(&self) -> Result<(), ExecutorError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            let id = task.id();
            if !seen.insert(id.clone()) {
                return Err(ExecutorError::DuplicateTaskId(id));
            }
        }

        let pending: HashSet<String> =
            self.store.get_pending_tasks().await?.into_iter().collect();
        let mut queue: VecDeque<Arc<dyn Task>> = self
            .tasks
            .iter()
            .filter(|task| pending.contains(&task.id()))
            .cloned()
            .collect();

        if queue.is_empty() {
            println!("All tasks are already completed.");
            return Ok(());
        }

        info!(
            count = queue.len(),
            max_concurrency = self.max_concurrency,
            "Dispatching pending tasks"
        );

        let mut in_flight: JoinSet<WorkerOutput> = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, String> = HashMap::new();

        // Fill the pool up to the concurrency limit; one new task is
        // dispatched per harvested completion after that, in input order.
        while in_flight.len() < self.max_concurrency {
            let Some(task) = queue.pop_front() else { break };
            Self::dispatch(&mut in_flight, &mut running, task);
        }

        while let Some(joined) = in_flight.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((worker, (id, outcome))) => {
                    running.remove(&worker);
                    (id, outcome)
                }
                Err(join_error) => {
                    // Worker panicked before returning an outcome.
                    let Some(id) = running.remove(&join_error.id()) else {
                        continue;
                    };
                    (id, Err(anyhow::anyhow!("task panicked: {join_error}")))
                }
            };

            match outcome {
                Ok(result) => {
                    debug!(id = %id, "Task completed");
                    self.store
                        .update_task_statuses(&[StatusUpdate::completed(id.as_str(), result)])
                        .await?;
                }
                Err(fault) => {
                    warn!(id = %id, error = %fault, "Task failed");
                    self.store
                        .update_task_statuses(&[StatusUpdate::failed(
                            id.as_str(),
                            fault.to_string(),
                        )])
                        .await?;
                }
            }

            if self.stop_when.as_ref().is_some_and(|stop| stop()) {
                warn!("Emergency stop condition met, halting execution");
                // In-flight invocations keep running but their outcomes
                // are not recorded in this run.
                in_flight.detach_all();
                break;
            }

            if let Some(task) = queue.pop_front() {
                Self::dispatch(&mut in_flight, &mut running, task);
            }
        }

        let summary = self.status_summary().await?;
        println!("{summary}");
        Ok(())
    }

    /// Current status counts, read from the store at call time.
    pub async fn status_summary(&self) -> Result<StatusSummary, StoreError> {
        Ok(StatusSummary {
            pending: self.store.get_pending_tasks().await?.len(),
            completed: self.store.get_completed_tasks().await?.len(),
            failed: self.store.get_failed_tasks().await?.len(),
        })
    }

    fn dispatch(
        in_flight: &mut JoinSet<WorkerOutput>,
        running: &mut HashMap<tokio::task::Id, String>,
        task: Arc<dyn Task>,
    ) {
        let id = task.id();
        debug!(id = %id, "Dispatching task");
        let handle = in_flight.spawn(async move {
            let id = task.id();
            let outcome = task.invoke().await;
            (id, outcome)
        });
        running.insert(handle.id(), id);
    }
}

/// Builder for constructing an [`Executor`].
pub struct ExecutorBuilder<S> {
    store: S,
    tasks: Vec<Arc<dyn Task>>,
    max_concurrency: usize,
    stop_when: Option<StopFn>,
}

impl<S: TaskStore> ExecutorBuilder<S> {
    /// Create a new builder with the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            tasks: Vec::new(),
            max_concurrency: 4,
            stop_when: None,
        }
    }

    /// Add a task to the collection.
    pub fn task(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    /// Add a batch of tasks to the collection.
    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Arc<dyn Task>>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Set the upper bound on simultaneously running invocations.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrency` is 0.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        assert!(max_concurrency > 0, "max_concurrency must be at least 1");
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set a stop predicate, checked by the driver after each completion.
    ///
    /// When it returns true, no further tasks are dispatched and no further
    /// completions are awaited. Invocations already running are not
    /// cancelled.
    pub fn stop_when(mut self, stop: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.stop_when = Some(Arc::new(stop));
        self
    }

    /// Build the executor.
    pub fn build(self) -> Executor<S> {
        Executor {
            store: self.store,
            tasks: self.tasks,
            max_concurrency: self.max_concurrency,
            stop_when: self.stop_when,
        }
    }
}
