//! Todosync - Offline-first task synchronization
//!
//! This crate provides a unified API over the todosync workspace: the core
//! data model plus the client-side cache, remote client, and reconciliation
//! engine.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use todosync::{HttpRemote, SyncEngine, TaskDraft, TaskStore};
//!
//! let store = TaskStore::new("sqlite:tasks.db").await?;
//! let remote = Arc::new(HttpRemote::new("https://api.example.com", "wss://api.example.com/ws")?);
//! let engine = SyncEngine::new(store, remote, "user-1".into()).await?;
//! engine.add_task(TaskDraft::new("Buy milk")).await?;
//! ```

// Re-export client types
pub use todosync_client::{
    drafts_from, project, AuthSession, ClientError, ClientResult, CurrentUser, EngineConfig,
    EventDispatcher, EventKind, HttpRemote, RemoteTasks, SortKey, StatusFilter, Subscription,
    SuggestClient, SyncEngine, TaskEvent, TaskFeed, TaskPage, TaskQuery, TaskStore,
};

// Re-export core types that external applications may need
pub use todosync_core::errors::{RemoteError, ValidationError};
pub use todosync_core::models::{
    Priority, SyncState, Task, TaskDraft, TaskFields, TaskId, UserId,
};
pub use todosync_core::protocol::{ClientMessage, ServerMessage};
