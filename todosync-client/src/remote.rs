use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use todosync_core::{RemoteError, Task, TaskDraft, TaskFields, TaskId, UserId};

/// The hosted task service, as the reconciliation engine sees it.
///
/// Implementations never retain task state between calls; the engine owns
/// the authoritative view. Every method fails with `RemoteError::Unavailable`
/// for transient trouble and `Rejected`/`NotFound` for permanent outcomes.
#[async_trait]
pub trait RemoteTasks: Send + Sync {
    /// Create a task; the server assigns the id and timestamps.
    async fn create(&self, owner_id: &UserId, draft: &TaskDraft) -> Result<Task, RemoteError>;

    async fn update(
        &self,
        owner_id: &UserId,
        id: &TaskId,
        fields: &TaskFields,
    ) -> Result<(), RemoteError>;

    async fn delete(&self, owner_id: &UserId, id: &TaskId) -> Result<(), RemoteError>;

    /// Open a live feed of the owner's full task set. The feed yields the
    /// current set immediately and again after every remote change.
    async fn subscribe(&self, owner_id: &UserId) -> Result<TaskFeed, RemoteError>;
}

/// A live snapshot feed plus its cancellation handle.
pub struct TaskFeed {
    rx: mpsc::Receiver<Vec<Task>>,
    subscription: Subscription,
}

impl TaskFeed {
    pub fn new(rx: mpsc::Receiver<Vec<Task>>, subscription: Subscription) -> Self {
        Self { rx, subscription }
    }

    /// Next full snapshot; `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<Vec<Task>> {
        self.rx.recv().await
    }

    pub fn into_parts(self) -> (mpsc::Receiver<Vec<Task>>, Subscription) {
        (self.rx, self.subscription)
    }
}

/// Handle for tearing down a live feed. `unsubscribe` is idempotent and safe
/// to call after the owning view is gone; dropping the handle unsubscribes.
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(cancelled: Arc<AtomicBool>, handle: JoinHandle<()>) -> Self {
        Self {
            cancelled,
            handle: Some(handle),
        }
    }

    /// A subscription with nothing to tear down (in-process feeds, tests).
    pub fn noop() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn unsubscribe(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
