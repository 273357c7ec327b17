//! The reconciliation engine: merges local optimistic mutations with the
//! remote service's live snapshots and owns the authoritative task set.
//!
//! All state lives in a single event-loop task fed by a channel; the handle
//! posts events and gets optimistic results back over oneshot acks, so no
//! caller ever waits on the network.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use todosync_core::{
    validate_title, OperationPayload, PendingOperation, RemoteError, SyncState, Task, TaskDraft,
    TaskFields, TaskId, UserId,
};

use crate::errors::{ClientError, ClientResult};
use crate::events::EventDispatcher;
use crate::remote::{RemoteTasks, Subscription, TaskFeed};
use crate::store::TaskStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a dirty task waits before its write is dispatched; rapid
    /// successive edits inside this window produce a single remote call.
    pub coalesce_window: Duration,
    /// Writes that neither succeed nor fail within this window count as
    /// `RemoteUnavailable`.
    pub write_timeout: Duration,
    pub retry_initial: Duration,
    pub retry_max: Duration,
    pub resubscribe_initial: Duration,
    pub resubscribe_max: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_millis(25),
            write_timeout: Duration::from_secs(10),
            retry_initial: Duration::from_millis(500),
            retry_max: Duration::from_secs(30),
            resubscribe_initial: Duration::from_secs(1),
            resubscribe_max: Duration::from_secs(30),
        }
    }
}

enum Event {
    Add {
        draft: TaskDraft,
        ack: oneshot::Sender<ClientResult<Task>>,
    },
    AddMany {
        drafts: Vec<TaskDraft>,
        ack: oneshot::Sender<ClientResult<Vec<Task>>>,
    },
    Update {
        id: TaskId,
        fields: TaskFields,
        ack: oneshot::Sender<ClientResult<()>>,
    },
    Delete {
        id: TaskId,
        ack: oneshot::Sender<ClientResult<()>>,
    },
    Query {
        ack: oneshot::Sender<Vec<Task>>,
    },
    PendingCount {
        ack: oneshot::Sender<usize>,
    },
    Dispatch {
        id: TaskId,
    },
    WriteDone {
        id: TaskId,
        sent_seq: u64,
        outcome: WriteOutcome,
    },
    SnapshotArrived {
        tasks: Vec<Task>,
    },
    FeedUp {
        feed: TaskFeed,
    },
    /// Tagged with the generation of the feed that went down, so a teardown
    /// we caused ourselves cannot knock out its replacement.
    FeedDown {
        gen: u64,
    },
    Resubscribe,
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

enum WriteOutcome {
    Created(Task),
    Done,
    Failed(RemoteError),
}

/// Handle to a running reconciliation engine. Cloneable; methods return as
/// soon as the optimistic state change is recorded.
#[derive(Clone)]
pub struct SyncEngine {
    tx: mpsc::Sender<Event>,
    dispatcher: Arc<EventDispatcher>,
}

impl SyncEngine {
    pub async fn new(
        store: TaskStore,
        remote: Arc<dyn RemoteTasks>,
        owner_id: UserId,
    ) -> ClientResult<Self> {
        Self::with_config(store, remote, owner_id, EngineConfig::default()).await
    }

    pub async fn with_config(
        store: TaskStore,
        remote: Arc<dyn RemoteTasks>,
        owner_id: UserId,
        config: EngineConfig,
    ) -> ClientResult<Self> {
        store.init().await?;

        // Seed from the durable cache: the authoritative set plus any queue
        // left over from a previous run.
        let mut tasks = HashMap::new();
        for task in store.load_tasks(&owner_id).await? {
            tasks.insert(task.id.clone(), task);
        }
        let mut pending = HashMap::new();
        let mut edit_seq = 0u64;
        for op in store.list_pending(&owner_id).await? {
            edit_seq = edit_seq.max(op.edit_seq);
            pending.insert(op.task_id.clone(), op);
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let dispatcher = Arc::new(EventDispatcher::new());

        let mut state = EngineState {
            store,
            remote,
            owner_id,
            config,
            dispatcher: dispatcher.clone(),
            tx: tx.clone(),
            tasks,
            pending,
            rollbacks: HashMap::new(),
            held: HashMap::new(),
            in_flight: HashSet::new(),
            scheduled: HashSet::new(),
            retries: HashMap::new(),
            edit_seq,
            online: false,
            subscription: None,
            feed_gen: 0,
            resubscribe_scheduled: false,
            feed_backoff: None,
        };

        // Replay anything queued before the restart, then bring the feed up.
        let queued: Vec<TaskId> = state.pending.keys().cloned().collect();
        for id in queued {
            state.schedule_dispatch(&id);
        }
        state.post(Event::Resubscribe);

        tokio::spawn(state.run(rx));

        Ok(Self { tx, dispatcher })
    }

    pub fn events(&self) -> Arc<EventDispatcher> {
        self.dispatcher.clone()
    }

    /// Create a task. Returns the locally-provisional copy immediately; the
    /// id is replaced once the service confirms (see `TaskIdChanged`).
    pub async fn add_task(&self, mut draft: TaskDraft) -> ClientResult<Task> {
        draft.title = validate_title(&draft.title)?;
        let (ack, rx) = oneshot::channel();
        self.send(Event::Add { draft, ack }).await?;
        rx.await.map_err(|_| ClientError::EngineClosed)?
    }

    /// Create several tasks at once (AI-suggested batches take this path).
    pub async fn add_tasks(&self, drafts: Vec<TaskDraft>) -> ClientResult<Vec<Task>> {
        let mut validated = Vec::with_capacity(drafts.len());
        for mut draft in drafts {
            draft.title = validate_title(&draft.title)?;
            validated.push(draft);
        }
        let (ack, rx) = oneshot::channel();
        self.send(Event::AddMany {
            drafts: validated,
            ack,
        })
        .await?;
        rx.await.map_err(|_| ClientError::EngineClosed)?
    }

    pub async fn update_task(&self, id: &TaskId, mut fields: TaskFields) -> ClientResult<()> {
        if let Some(title) = fields.title.take() {
            fields.title = Some(validate_title(&title)?);
        }
        let (ack, rx) = oneshot::channel();
        self.send(Event::Update {
            id: id.clone(),
            fields,
            ack,
        })
        .await?;
        rx.await.map_err(|_| ClientError::EngineClosed)?
    }

    pub async fn delete_task(&self, id: &TaskId) -> ClientResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(Event::Delete { id: id.clone(), ack }).await?;
        rx.await.map_err(|_| ClientError::EngineClosed)?
    }

    /// The authoritative set, including tasks hidden from projections while
    /// their delete is unconfirmed. Ordered by creation time then id.
    pub async fn tasks(&self) -> ClientResult<Vec<Task>> {
        let (ack, rx) = oneshot::channel();
        self.send(Event::Query { ack }).await?;
        rx.await.map_err(|_| ClientError::EngineClosed)
    }

    /// Number of queued operations not yet confirmed remotely.
    pub async fn pending_count(&self) -> ClientResult<usize> {
        let (ack, rx) = oneshot::channel();
        self.send(Event::PendingCount { ack }).await?;
        rx.await.map_err(|_| ClientError::EngineClosed)
    }

    pub async fn shutdown(&self) -> ClientResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(Event::Shutdown { ack }).await?;
        rx.await.map_err(|_| ClientError::EngineClosed)
    }

    async fn send(&self, event: Event) -> ClientResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ClientError::EngineClosed)
    }
}

struct EngineState {
    store: TaskStore,
    remote: Arc<dyn RemoteTasks>,
    owner_id: UserId,
    config: EngineConfig,
    dispatcher: Arc<EventDispatcher>,
    tx: mpsc::Sender<Event>,

    /// The one authoritative copy of every task.
    tasks: HashMap<TaskId, Task>,
    /// At most one queued operation per task id.
    pending: HashMap<TaskId, PendingOperation>,
    /// Pre-edit copies for rolling back rejected operations.
    rollbacks: HashMap<TaskId, Task>,
    /// Snapshot values withheld while the task has an unresolved operation.
    held: HashMap<TaskId, Task>,
    in_flight: HashSet<TaskId>,
    scheduled: HashSet<TaskId>,
    retries: HashMap<TaskId, ExponentialBackoff>,
    edit_seq: u64,
    online: bool,
    subscription: Option<Subscription>,
    /// Bumped whenever a feed comes up or is torn down; `FeedDown` events
    /// from older generations are stale and ignored.
    feed_gen: u64,
    resubscribe_scheduled: bool,
    feed_backoff: Option<ExponentialBackoff>,
}

impl EngineState {
    async fn run(mut self, mut rx: mpsc::Receiver<Event>) {
        tracing::info!(owner = %self.owner_id, "reconciliation engine started");
        while let Some(event) = rx.recv().await {
            if self.handle_event(event).await {
                break;
            }
        }
        tracing::info!(owner = %self.owner_id, "reconciliation engine stopped");
    }

    /// Returns true on shutdown.
    async fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Add { draft, ack } => {
                let _ = ack.send(self.apply_add(draft).await);
            }
            Event::AddMany { drafts, ack } => {
                let mut created = Vec::with_capacity(drafts.len());
                let mut failed = None;
                for draft in drafts {
                    match self.apply_add(draft).await {
                        Ok(task) => created.push(task),
                        Err(e) => {
                            failed = Some(e);
                            break;
                        }
                    }
                }
                let _ = ack.send(match failed {
                    None => Ok(created),
                    Some(e) => Err(e),
                });
            }
            Event::Update { id, fields, ack } => {
                let _ = ack.send(self.apply_update(&id, fields).await);
            }
            Event::Delete { id, ack } => {
                let _ = ack.send(self.apply_delete(&id).await);
            }
            Event::Query { ack } => {
                let mut all: Vec<Task> = self.tasks.values().cloned().collect();
                all.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
                let _ = ack.send(all);
            }
            Event::PendingCount { ack } => {
                let _ = ack.send(self.pending.len());
            }
            Event::Dispatch { id } => {
                self.dispatch(&id).await;
            }
            Event::WriteDone {
                id,
                sent_seq,
                outcome,
            } => {
                if let Err(e) = self.write_done(&id, sent_seq, outcome).await {
                    tracing::error!(task = %id, "failed to persist write outcome: {}", e);
                    self.dispatcher.emit_sync_error(&e.to_string());
                }
            }
            Event::SnapshotArrived { tasks } => {
                if let Err(e) = self.reconcile_snapshot(tasks).await {
                    tracing::error!("failed to persist snapshot: {}", e);
                    self.dispatcher.emit_sync_error(&e.to_string());
                }
            }
            Event::FeedUp { feed } => {
                self.feed_up(feed);
            }
            Event::FeedDown { gen } => {
                self.feed_down(gen);
            }
            Event::Resubscribe => {
                self.resubscribe();
            }
            Event::Shutdown { ack } => {
                if let Some(mut sub) = self.subscription.take() {
                    sub.unsubscribe();
                }
                let _ = ack.send(());
                return true;
            }
        }
        false
    }

    // ---- UI mutations -----------------------------------------------------

    async fn apply_add(&mut self, draft: TaskDraft) -> ClientResult<Task> {
        let task = Task::provisional(self.owner_id.clone(), &draft, Utc::now());
        let id = task.id.clone();
        tracing::info!(task = %id, title = %task.title, "optimistic create");

        self.edit_seq += 1;
        let op = PendingOperation::new(
            self.owner_id.clone(),
            id.clone(),
            OperationPayload::Create { draft },
            self.edit_seq,
        );

        self.tasks.insert(id.clone(), task.clone());
        self.pending.insert(id.clone(), op.clone());
        self.store.save_task(&task).await?;
        self.store.enqueue_pending(&op).await?;

        self.dispatcher.emit_task_created(&task);
        self.schedule_dispatch(&id);
        Ok(task)
    }

    async fn apply_update(&mut self, id: &TaskId, fields: TaskFields) -> ClientResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        if !self.tasks.contains_key(id) {
            return Err(RemoteError::NotFound(id.clone()).into());
        }

        self.edit_seq += 1;
        let seq = self.edit_seq;

        match self.pending.get_mut(id) {
            Some(op) => match &mut op.payload {
                // A queued delete supersedes any later edit.
                OperationPayload::Delete => {
                    tracing::debug!(task = %id, "edit dropped; delete already queued");
                    return Ok(());
                }
                OperationPayload::Create { draft } => {
                    draft.apply(&fields);
                    op.edit_seq = seq;
                    let op = op.clone();
                    self.touch_task(id, &fields);
                    self.store.update_pending(&op).await?;
                }
                OperationPayload::Update { fields: queued } => {
                    queued.merge(fields.clone());
                    op.edit_seq = seq;
                    let op = op.clone();
                    self.touch_task(id, &fields);
                    self.store.update_pending(&op).await?;
                }
            },
            None => {
                let before = self.tasks[id].clone();
                self.rollbacks.insert(id.clone(), before);

                let op = PendingOperation::new(
                    self.owner_id.clone(),
                    id.clone(),
                    OperationPayload::Update {
                        fields: fields.clone(),
                    },
                    seq,
                );
                self.pending.insert(id.clone(), op.clone());
                self.touch_task(id, &fields);
                if let Some(task) = self.tasks.get_mut(id) {
                    task.sync_state = SyncState::PendingUpdate;
                }
                self.store.enqueue_pending(&op).await?;
            }
        }

        let task = self.tasks[id].clone();
        self.store.save_task(&task).await?;
        self.dispatcher.emit_task_updated(&task);
        self.schedule_dispatch(id);
        Ok(())
    }

    async fn apply_delete(&mut self, id: &TaskId) -> ClientResult<()> {
        if !self.tasks.contains_key(id) {
            return Err(RemoteError::NotFound(id.clone()).into());
        }

        self.edit_seq += 1;
        let seq = self.edit_seq;

        match self.pending.get_mut(id) {
            Some(op) if matches!(op.payload, OperationPayload::Delete) => return Ok(()),
            // A never-synced create can be dropped on both sides locally.
            Some(op)
                if matches!(op.payload, OperationPayload::Create { .. })
                    && !self.in_flight.contains(id) =>
            {
                let op_id = op.op_id;
                tracing::info!(task = %id, "delete cancels unsent create");
                self.pending.remove(id);
                self.tasks.remove(id);
                self.rollbacks.remove(id);
                self.store.dequeue_pending(&op_id).await?;
                self.store.remove_task(id).await?;
                self.dispatcher.emit_task_deleted(id);
                return Ok(());
            }
            // Delete wins over any queued (or in-flight) edit or create.
            Some(op) => {
                op.payload = OperationPayload::Delete;
                op.edit_seq = seq;
                let op = op.clone();
                self.store.update_pending(&op).await?;
            }
            None => {
                let before = self.tasks[id].clone();
                self.rollbacks.insert(id.clone(), before);
                let op = PendingOperation::new(
                    self.owner_id.clone(),
                    id.clone(),
                    OperationPayload::Delete,
                    seq,
                );
                self.pending.insert(id.clone(), op.clone());
                self.store.enqueue_pending(&op).await?;
            }
        }

        if let Some(task) = self.tasks.get_mut(id) {
            task.sync_state = SyncState::PendingDelete;
            task.updated_at = Utc::now();
            let task = task.clone();
            self.store.save_task(&task).await?;
        }

        // Hidden from projections immediately, retained until confirmed.
        self.dispatcher.emit_task_deleted(id);
        self.schedule_dispatch(id);
        Ok(())
    }

    fn touch_task(&mut self, id: &TaskId, fields: &TaskFields) {
        if let Some(task) = self.tasks.get_mut(id) {
            fields.apply_to(task);
            task.updated_at = Utc::now();
        }
    }

    // ---- write dispatch ---------------------------------------------------

    fn schedule_dispatch(&mut self, id: &TaskId) {
        self.schedule_dispatch_after(id, self.config.coalesce_window);
    }

    fn schedule_dispatch_after(&mut self, id: &TaskId, delay: Duration) {
        if self.in_flight.contains(id) || self.scheduled.contains(id) {
            return;
        }
        self.scheduled.insert(id.clone());

        let tx = self.tx.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Dispatch { id }).await;
        });
    }

    async fn dispatch(&mut self, id: &TaskId) {
        self.scheduled.remove(id);
        if self.in_flight.contains(id) {
            return;
        }
        let Some(op) = self.pending.get_mut(id) else {
            return;
        };

        op.attempts += 1;
        let op = op.clone();
        if let Err(e) = self.store.update_pending(&op).await {
            tracing::warn!(task = %id, "failed to persist attempt count: {}", e);
        }

        tracing::info!(
            task = %id,
            kind = %op.kind(),
            attempt = op.attempts,
            "dispatching remote write"
        );
        self.in_flight.insert(id.clone());

        let remote = self.remote.clone();
        let owner_id = self.owner_id.clone();
        let tx = self.tx.clone();
        let id = id.clone();
        let payload = op.payload.clone();
        let sent_seq = op.edit_seq;
        let timeout = self.config.write_timeout;

        tokio::spawn(async move {
            let call = async {
                match &payload {
                    OperationPayload::Create { draft } => {
                        remote.create(&owner_id, draft).await.map(WriteOutcome::Created)
                    }
                    OperationPayload::Update { fields } => {
                        remote.update(&owner_id, &id, fields).await.map(|_| WriteOutcome::Done)
                    }
                    OperationPayload::Delete => {
                        remote.delete(&owner_id, &id).await.map(|_| WriteOutcome::Done)
                    }
                }
            };

            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => WriteOutcome::Failed(e),
                Err(_) => WriteOutcome::Failed(RemoteError::Unavailable(
                    "remote write timed out".to_string(),
                )),
            };

            let _ = tx.send(Event::WriteDone { id, sent_seq, outcome }).await;
        });
    }

    async fn write_done(
        &mut self,
        id: &TaskId,
        sent_seq: u64,
        outcome: WriteOutcome,
    ) -> ClientResult<()> {
        self.in_flight.remove(id);
        let Some(op) = self.pending.get(id).cloned() else {
            return Ok(());
        };

        match outcome {
            WriteOutcome::Created(server_task) => {
                self.retries.remove(id);
                self.create_confirmed(id, sent_seq, server_task, op).await?;
            }
            WriteOutcome::Done => {
                self.retries.remove(id);
                if op.edit_seq > sent_seq {
                    // A newer local edit superseded the confirmed payload;
                    // send the latest one.
                    tracing::debug!(task = %id, "confirmed write superseded; dispatching latest");
                    self.schedule_dispatch(id);
                    return Ok(());
                }
                match op.payload {
                    OperationPayload::Update { .. } => {
                        self.finish_update(id, &op).await?;
                    }
                    OperationPayload::Delete => {
                        tracing::info!(task = %id, "delete confirmed");
                        self.pending.remove(id);
                        self.tasks.remove(id);
                        self.rollbacks.remove(id);
                        self.held.remove(id);
                        self.store.dequeue_pending(&op.op_id).await?;
                        self.store.remove_task(id).await?;
                    }
                    OperationPayload::Create { .. } => {
                        // A create resolves through the Created arm.
                    }
                }
            }
            WriteOutcome::Failed(RemoteError::Unavailable(reason)) => {
                let delay = self.next_retry_delay(id);
                tracing::warn!(
                    task = %id,
                    retry_in_ms = delay.as_millis() as u64,
                    "remote unavailable ({}); operation stays queued",
                    reason
                );
                self.schedule_dispatch_after(id, delay);
            }
            WriteOutcome::Failed(RemoteError::Rejected(reason)) => {
                tracing::error!(task = %id, "remote rejected write: {}", reason);
                self.retries.remove(id);
                self.rollback(id, &op).await?;
                self.dispatcher.emit_sync_error(&reason);
            }
            WriteOutcome::Failed(RemoteError::NotFound(_)) => {
                tracing::warn!(task = %id, "remote no longer knows this task; resyncing");
                self.retries.remove(id);
                self.pending.remove(id);
                self.tasks.remove(id);
                self.rollbacks.remove(id);
                self.held.remove(id);
                self.store.dequeue_pending(&op.op_id).await?;
                self.store.remove_task(id).await?;
                self.dispatcher.emit_task_deleted(id);
                self.dispatcher
                    .emit_sync_error(&format!("task {} no longer exists", id));
                self.drop_feed();
                self.post(Event::Resubscribe);
            }
        }
        Ok(())
    }

    async fn create_confirmed(
        &mut self,
        old_id: &TaskId,
        sent_seq: u64,
        server_task: Task,
        op: PendingOperation,
    ) -> ClientResult<()> {
        let new_id = server_task.id.clone();
        tracing::info!(old = %old_id, new = %new_id, "create confirmed; adopting server id");

        if op.edit_seq > sent_seq {
            // Edits (or a delete) landed while the create was in flight.
            // Keep the optimistic fields under the new id and dispatch the
            // follow-up.
            if let Some(mut task) = self.tasks.remove(old_id) {
                task.id = new_id.clone();
                self.tasks.insert(new_id.clone(), task);
            }
            let mut op = op;
            op.task_id = new_id.clone();
            if let OperationPayload::Create { draft } = &op.payload {
                let fields = draft.as_fields();
                op.payload = OperationPayload::Update { fields };
            }
            self.pending.remove(old_id);
            self.pending.insert(new_id.clone(), op.clone());
            if let Some(held) = self.held.remove(old_id) {
                self.held.insert(new_id.clone(), held);
            }
            if let Some(rb) = self.rollbacks.remove(old_id) {
                self.rollbacks.insert(new_id.clone(), rb);
            }

            // The follow-up must go out even if the cache write fails; the
            // in-memory queue entry is already under the new id.
            if let Err(e) = self.store.rename_task(old_id, &new_id).await {
                tracing::error!(old = %old_id, new = %new_id, "failed to persist id swap: {}", e);
                self.dispatcher.emit_sync_error(&e.to_string());
            } else if let Err(e) = self.store.update_pending(&op).await {
                tracing::error!(task = %new_id, "failed to persist follow-up payload: {}", e);
                self.dispatcher.emit_sync_error(&e.to_string());
            }

            self.dispatcher.emit_task_id_changed(old_id, &new_id);
            self.schedule_dispatch(&new_id);
            return Ok(());
        }

        // Clean confirmation: server copy becomes authoritative.
        let mut confirmed = server_task;
        confirmed.sync_state = SyncState::Synced;

        self.pending.remove(old_id);
        self.tasks.remove(old_id);
        self.rollbacks.remove(old_id);
        self.held.remove(old_id);
        self.held.remove(&new_id);
        self.tasks.insert(new_id.clone(), confirmed.clone());

        self.store.dequeue_pending(&op.op_id).await?;
        self.store.remove_task(old_id).await?;
        self.store.save_task(&confirmed).await?;

        if old_id != &new_id {
            self.dispatcher.emit_task_id_changed(old_id, &new_id);
        }
        self.dispatcher.emit_task_updated(&confirmed);
        Ok(())
    }

    async fn finish_update(&mut self, id: &TaskId, op: &PendingOperation) -> ClientResult<()> {
        tracing::info!(task = %id, "update confirmed");
        self.pending.remove(id);
        self.rollbacks.remove(id);
        // The held snapshot predates our confirmed write; the feed will push
        // a fresh authoritative set now that nothing is pending here.
        self.held.remove(id);
        self.store.dequeue_pending(&op.op_id).await?;

        if let Some(task) = self.tasks.get_mut(id) {
            task.sync_state = SyncState::Synced;
            let task = task.clone();
            self.store.save_task(&task).await?;
            self.dispatcher.emit_task_updated(&task);
        }
        Ok(())
    }

    async fn rollback(&mut self, id: &TaskId, op: &PendingOperation) -> ClientResult<()> {
        self.pending.remove(id);
        self.store.dequeue_pending(&op.op_id).await?;

        match &op.payload {
            OperationPayload::Create { .. } => {
                self.tasks.remove(id);
                self.rollbacks.remove(id);
                self.held.remove(id);
                self.store.remove_task(id).await?;
                self.dispatcher.emit_task_deleted(id);
            }
            OperationPayload::Update { .. } | OperationPayload::Delete => {
                // Prefer what the remote told us meanwhile over the pre-edit
                // copy.
                let restored = self
                    .held
                    .remove(id)
                    .or_else(|| self.rollbacks.remove(id));
                if let Some(mut task) = restored {
                    task.sync_state = SyncState::Synced;
                    self.tasks.insert(id.clone(), task.clone());
                    self.store.save_task(&task).await?;
                    self.dispatcher.emit_task_updated(&task);
                } else if let Some(task) = self.tasks.get_mut(id) {
                    // No copy to restore; leave the optimistic value and let
                    // the next snapshot settle it.
                    task.sync_state = SyncState::Synced;
                    let task = task.clone();
                    self.store.save_task(&task).await?;
                    self.dispatcher.emit_task_updated(&task);
                }
            }
        }
        Ok(())
    }

    fn next_retry_delay(&mut self, id: &TaskId) -> Duration {
        let initial = self.config.retry_initial;
        let max = self.config.retry_max;
        let backoff = self
            .retries
            .entry(id.clone())
            .or_insert_with(|| ExponentialBackoff {
                initial_interval: initial,
                max_interval: max,
                max_elapsed_time: None,
                ..Default::default()
            });
        backoff.next_backoff().unwrap_or(max)
    }

    // ---- live feed --------------------------------------------------------

    async fn reconcile_snapshot(&mut self, snapshot: Vec<Task>) -> ClientResult<()> {
        tracing::debug!(count = snapshot.len(), "snapshot received");
        let mut incoming: HashMap<TaskId, Task> = HashMap::new();
        for mut task in snapshot {
            task.sync_state = SyncState::Synced;
            incoming.insert(task.id.clone(), task);
        }

        // Remote is authoritative at rest: replace tasks with no pending
        // operation outright, hold the rest until their operation resolves.
        for (id, remote_task) in &incoming {
            if self.pending.contains_key(id) {
                self.held.insert(id.clone(), remote_task.clone());
                continue;
            }
            let existed = self.tasks.contains_key(id);
            let changed = self.tasks.get(id) != Some(remote_task);
            if changed {
                self.tasks.insert(id.clone(), remote_task.clone());
                self.store.save_task(remote_task).await?;
                if existed {
                    self.dispatcher.emit_task_updated(remote_task);
                } else {
                    self.dispatcher.emit_task_created(remote_task);
                }
            }
        }

        // Tasks gone remotely disappear locally too, unless something local
        // is still unconfirmed for them.
        let absent: Vec<TaskId> = self
            .tasks
            .keys()
            .filter(|id| !incoming.contains_key(*id) && !self.pending.contains_key(*id))
            .cloned()
            .collect();
        for id in absent {
            self.tasks.remove(&id);
            self.held.remove(&id);
            self.store.remove_task(&id).await?;
            self.dispatcher.emit_task_deleted(&id);
        }

        self.dispatcher.emit_sync_completed(incoming.len());
        Ok(())
    }

    fn feed_up(&mut self, feed: TaskFeed) {
        tracing::info!(owner = %self.owner_id, "live feed connected");
        self.drop_feed();
        let (mut rx, subscription) = feed.into_parts();
        self.subscription = Some(subscription);
        self.feed_gen += 1;
        self.feed_backoff = None;
        if !self.online {
            self.online = true;
            self.dispatcher.emit_connection_changed(true);
        }
        self.dispatcher.emit_sync_started();

        let gen = self.feed_gen;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(tasks) = rx.recv().await {
                if tx.send(Event::SnapshotArrived { tasks }).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Event::FeedDown { gen }).await;
        });

        // Upload-first replay: everything queued goes out now, in order.
        let queued: Vec<TaskId> = self.pending.keys().cloned().collect();
        for id in queued {
            self.schedule_dispatch(&id);
        }
    }

    fn feed_down(&mut self, gen: u64) {
        if gen != self.feed_gen {
            return;
        }
        self.drop_feed();
        if self.online {
            tracing::warn!(owner = %self.owner_id, "live feed lost");
            self.online = false;
            self.dispatcher.emit_connection_changed(false);
        }
        if self.resubscribe_scheduled {
            return;
        }
        self.resubscribe_scheduled = true;

        let delay = {
            let initial = self.config.resubscribe_initial;
            let max = self.config.resubscribe_max;
            let backoff = self.feed_backoff.get_or_insert_with(|| ExponentialBackoff {
                initial_interval: initial,
                max_interval: max,
                max_elapsed_time: None,
                ..Default::default()
            });
            backoff.next_backoff().unwrap_or(max)
        };

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Resubscribe).await;
        });
    }

    fn resubscribe(&mut self) {
        self.resubscribe_scheduled = false;
        if self.subscription.is_some() {
            return;
        }

        let gen = self.feed_gen;
        let remote = self.remote.clone();
        let owner_id = self.owner_id.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match remote.subscribe(&owner_id).await {
                Ok(feed) => {
                    let _ = tx.send(Event::FeedUp { feed }).await;
                }
                Err(e) => {
                    tracing::debug!("subscribe failed: {}", e);
                    let _ = tx.send(Event::FeedDown { gen }).await;
                }
            }
        });
    }

    /// Tear down the current subscription, if any, and invalidate the
    /// `FeedDown` its dying forwarder will send.
    fn drop_feed(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.unsubscribe();
            self.feed_gen += 1;
        }
    }

    /// Post an event to our own queue without blocking the loop.
    fn post(&self, event: Event) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(event).await;
        });
    }
}
