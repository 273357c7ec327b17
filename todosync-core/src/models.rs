use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ValidationError;

/// Prefix carried by provisional ids minted on-device before the remote
/// service has assigned a real one.
const LOCAL_ID_PREFIX: &str = "local-";

/// Opaque task identifier. Server-assigned for synced tasks; provisional
/// (`local-<uuid>`) for tasks created before remote confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Mint a provisional id for an optimistically created task.
    pub fn local() -> Self {
        Self(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()))
    }

    /// Whether this id is provisional and still awaits the server-assigned one.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the owning user, as resolved by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    /// Sort rank, high first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// Where a task stands relative to the remote service. Local-only: persisted
/// in the cache but never sent over the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    #[default]
    Synced,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
}

impl SyncState {
    pub fn is_pending(&self) -> bool {
        !matches!(self, SyncState::Synced)
    }
}

/// The central entity: one to-do item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner_id: UserId,
    pub title: String,
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip, default)]
    pub sync_state: SyncState,
}

impl Task {
    /// Build a locally-provisional task from a draft. The id is temporary
    /// and the state is `PendingCreate` until the service confirms.
    pub fn provisional(owner_id: UserId, draft: &TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::local(),
            owner_id,
            title: draft.title.clone(),
            completed: draft.completed,
            priority: draft.priority,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::PendingCreate,
        }
    }
}

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            completed: false,
            priority: Priority::default(),
            due_date: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Fold a later partial edit into the draft (coalescing an edit made
    /// while the create is still unconfirmed).
    pub fn apply(&mut self, fields: &TaskFields) {
        if let Some(title) = &fields.title {
            self.title = title.clone();
        }
        if let Some(completed) = fields.completed {
            self.completed = completed;
        }
        if let Some(priority) = fields.priority {
            self.priority = priority;
        }
        if let Some(due_date) = fields.due_date {
            self.due_date = due_date;
        }
    }

    /// The draft expressed as a full-field update, used when edits landed on
    /// a create that was already in flight.
    pub fn as_fields(&self) -> TaskFields {
        TaskFields {
            title: Some(self.title.clone()),
            completed: Some(self.completed),
            priority: Some(self.priority),
            due_date: Some(self.due_date),
        }
    }
}

/// Partial update to a task. `due_date` is doubly optional so `Some(None)`
/// clears an existing date while `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
}

impl TaskFields {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }

    /// Coalesce a newer edit into this one; fields the newer edit set win.
    pub fn merge(&mut self, newer: TaskFields) {
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.completed.is_some() {
            self.completed = newer.completed;
        }
        if newer.priority.is_some() {
            self.priority = newer.priority;
        }
        if newer.due_date.is_some() {
            self.due_date = newer.due_date;
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

/// What a queued operation will send when it is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationPayload {
    Create { draft: TaskDraft },
    Update { fields: TaskFields },
    Delete,
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationPayload::Create { .. } => OperationKind::Create,
            OperationPayload::Update { .. } => OperationKind::Update,
            OperationPayload::Delete => OperationKind::Delete,
        }
    }
}

/// A queued local mutation not yet confirmed by the remote service.
///
/// At most one exists per task id; later edits coalesce into the payload.
/// `edit_seq` is a monotonic engine-local counter, so last-writer-wins is
/// decided by edit order rather than wall clocks.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub op_id: Uuid,
    pub owner_id: UserId,
    pub task_id: TaskId,
    pub payload: OperationPayload,
    pub enqueued_at: DateTime<Utc>,
    pub edit_seq: u64,
    pub attempts: u32,
}

impl PendingOperation {
    pub fn new(
        owner_id: UserId,
        task_id: TaskId,
        payload: OperationPayload,
        edit_seq: u64,
    ) -> Self {
        Self {
            op_id: Uuid::new_v4(),
            owner_id,
            task_id,
            payload,
            enqueued_at: Utc::now(),
            edit_seq,
            attempts: 0,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }
}

/// Trim and validate a title before it reaches the engine.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

/// Parse a calendar due date in the wire format (`2025-12-31`).
pub fn parse_due_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::BadDueDate(raw.to_string()))
}
