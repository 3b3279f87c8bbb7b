//! Task trait and invocation contract.

use async_trait::async_trait;

/// A unit of work that can be dispatched by the executor.
///
/// Implementors supply a stable, globally unique identifier and a
/// zero-argument invocation. The executor never constructs tasks or
/// generates identifiers; both come from the caller.
#[async_trait]
pub trait Task: Send + Sync {
    /// The stable identifier of this task, used as the store's primary key.
    fn id(&self) -> String;

    /// Execute the task, producing a JSON-serializable result.
    ///
    /// An `Err` marks the task as failed in the store with the error's
    /// display text as the recorded message. It never aborts the run or
    /// affects sibling tasks.
    async fn invoke(&self) -> anyhow::Result<serde_json::Value>;
}
