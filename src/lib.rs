//! # Foreman
//!
//! Crash-resumable concurrent task execution with a durable state store.
//!
//! Foreman runs a collection of independent tasks under a bounded
//! concurrency limit and persists each task's lifecycle state, so an
//! interrupted or repeated run picks up where it left off instead of
//! redoing completed work.
//!
//! - **Resumable** - completed and failed tasks are skipped on re-run;
//!   only pending work is dispatched
//! - **Bounded** - at most `max_concurrency` invocations run at once
//! - **Stoppable** - an external stop predicate halts further dispatch
//!   mid-run (rate limiting, API blocks)
//! - **Embeddable** - a library, not a service. Runs in your process.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use foreman::{ExecutorBuilder, SqliteTaskStore};
//!
//! let store = SqliteTaskStore::open("tasks.db").await?;
//! store.store_tasks(&definitions).await?;
//!
//! let executor = ExecutorBuilder::new(store)
//!     .tasks(tasks)
//!     .max_concurrency(4)
//!     .stop_when(|| rate_limited())
//!     .build();
//!
//! executor.run().await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` (default) - Enable the SQLite-backed task store

pub mod executor;
pub mod memory;
pub mod store;
pub mod task;

pub use executor::{Executor, ExecutorBuilder, ExecutorError, StatusSummary, StopFn};
pub use memory::MemoryTaskStore;
pub use store::{StatusUpdate, StoreDump, StoreError, TaskStatus, TaskStore};
pub use task::Task;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTaskStore;
