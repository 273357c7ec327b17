use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use todosync_client::{
    EngineConfig, EventDispatcher, RemoteTasks, Subscription, TaskEvent, TaskFeed, TaskStore,
};
use todosync_core::{
    Priority, RemoteError, SyncState, Task, TaskDraft, TaskFields, TaskId, UserId,
};

/// Installs a test subscriber so `RUST_LOG` surfaces engine traces.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates a fresh named shared-cache in-memory sqlite store, so every pool
/// connection sees the same database.
#[allow(dead_code)]
pub async fn setup_test_store() -> TaskStore {
    init_tracing();
    let url = format!(
        "sqlite:file:testdb-{}?mode=memory&cache=shared",
        Uuid::new_v4()
    );
    let store = TaskStore::new(&url).await.unwrap();
    store.init().await.unwrap();
    store
}

/// Engine config with windows shrunk enough to keep tests fast.
#[allow(dead_code)]
pub fn test_config() -> EngineConfig {
    EngineConfig {
        coalesce_window: Duration::from_millis(30),
        write_timeout: Duration::from_secs(1),
        retry_initial: Duration::from_millis(20),
        retry_max: Duration::from_millis(200),
        resubscribe_initial: Duration::from_millis(50),
        resubscribe_max: Duration::from_millis(500),
    }
}

/// Creates a server-side task as it would arrive in a feed snapshot.
#[allow(dead_code)]
pub fn make_task(id: &str, owner: &str, title: &str) -> Task {
    let now = Utc::now();
    Task {
        id: TaskId::from(id),
        owner_id: UserId::from(owner),
        title: title.to_string(),
        completed: false,
        priority: Priority::Low,
        due_date: None,
        created_at: now,
        updated_at: now,
        sync_state: SyncState::Synced,
    }
}

/// Polls a condition until it holds or the deadline expires.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(mut check: F, what: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
}

/// Collects every event an engine emits, for later inspection.
#[allow(dead_code)]
pub struct EventLog {
    events: Arc<Mutex<Vec<TaskEvent>>>,
}

#[allow(dead_code)]
impl EventLog {
    pub fn attach(dispatcher: &EventDispatcher) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        dispatcher.register(
            move |event: &TaskEvent| sink.lock().unwrap().push(event.clone()),
            None,
        );
        Self { events }
    }

    pub fn snapshot(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn id_changes(&self) -> Vec<(TaskId, TaskId)> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::TaskIdChanged { old, new } => Some((old, new)),
                _ => None,
            })
            .collect()
    }

    pub fn sync_errors(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::SyncError { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

/// A remote write the mock accepted, in arrival order.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum RemoteCall {
    Create { title: String },
    Update { id: TaskId, fields: TaskFields },
    Delete { id: TaskId },
}

/// In-process stand-in for the task service. Tests flip availability, queue
/// rejections, slow writes down, and push feed snapshots through it.
pub struct MockRemote {
    calls: Mutex<Vec<RemoteCall>>,
    unavailable: AtomicBool,
    reject_next: Mutex<VecDeque<String>>,
    delay: Mutex<Duration>,
    next_id: AtomicUsize,
    feed_tx: Mutex<Option<mpsc::Sender<Vec<Task>>>>,
    active_writes: AtomicUsize,
    max_active_writes: AtomicUsize,
}

#[allow(dead_code)]
impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            reject_next: Mutex::new(VecDeque::new()),
            delay: Mutex::new(Duration::ZERO),
            next_id: AtomicUsize::new(1),
            feed_tx: Mutex::new(None),
            active_writes: AtomicUsize::new(0),
            max_active_writes: AtomicUsize::new(0),
        })
    }

    pub fn offline() -> Arc<Self> {
        let remote = Self::new();
        remote.set_unavailable(true);
        remote
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn reject_next(&self, reason: &str) {
        self.reject_next
            .lock()
            .unwrap()
            .push_back(reason.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Successful writes, in order. Attempts turned away while unavailable
    /// are not recorded.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_active_writes.load(Ordering::SeqCst)
    }

    /// Push a snapshot down the feed the engine subscribed to.
    pub async fn push_snapshot(&self, tasks: Vec<Task>) {
        let tx = self
            .feed_tx
            .lock()
            .unwrap()
            .clone()
            .expect("engine has not subscribed yet");
        tx.send(tasks).await.unwrap();
    }

    async fn begin_write(&self) -> Result<(), RemoteError> {
        let n = self.active_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_writes.fetch_max(n, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            self.end_write();
            return Err(RemoteError::Unavailable("mock offline".to_string()));
        }
        if let Some(reason) = self.reject_next.lock().unwrap().pop_front() {
            self.end_write();
            return Err(RemoteError::Rejected(reason));
        }
        Ok(())
    }

    fn end_write(&self) {
        self.active_writes.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteTasks for MockRemote {
    async fn create(&self, owner_id: &UserId, draft: &TaskDraft) -> Result<Task, RemoteError> {
        self.begin_write().await?;
        self.calls.lock().unwrap().push(RemoteCall::Create {
            title: draft.title.clone(),
        });
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let task = Task {
            id: TaskId::from(format!("t{n}")),
            owner_id: owner_id.clone(),
            title: draft.title.clone(),
            completed: draft.completed,
            priority: draft.priority,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Synced,
        };
        self.end_write();
        Ok(task)
    }

    async fn update(
        &self,
        _owner_id: &UserId,
        id: &TaskId,
        fields: &TaskFields,
    ) -> Result<(), RemoteError> {
        self.begin_write().await?;
        self.calls.lock().unwrap().push(RemoteCall::Update {
            id: id.clone(),
            fields: fields.clone(),
        });
        self.end_write();
        Ok(())
    }

    async fn delete(&self, _owner_id: &UserId, id: &TaskId) -> Result<(), RemoteError> {
        self.begin_write().await?;
        self.calls
            .lock()
            .unwrap()
            .push(RemoteCall::Delete { id: id.clone() });
        self.end_write();
        Ok(())
    }

    async fn subscribe(&self, _owner_id: &UserId) -> Result<TaskFeed, RemoteError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("mock offline".to_string()));
        }
        let (tx, rx) = mpsc::channel(8);
        *self.feed_tx.lock().unwrap() = Some(tx);
        Ok(TaskFeed::new(rx, Subscription::noop()))
    }
}
