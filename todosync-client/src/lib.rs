//! Client-side sync layer for the to-do service: a durable SQLite cache, a
//! remote HTTP/WebSocket client, and a reconciliation engine that applies
//! local mutations optimistically and settles them against the live feed.

pub mod auth;
pub mod engine;
pub mod errors;
pub mod events;
pub mod http;
pub mod remote;
pub mod store;
pub mod suggest;
pub mod view;

mod feed;
mod queries;

pub use auth::{AuthSession, CurrentUser};
pub use engine::{EngineConfig, SyncEngine};
pub use errors::{ClientError, ClientResult};
pub use events::{EventDispatcher, EventKind, TaskEvent};
pub use http::HttpRemote;
pub use remote::{RemoteTasks, Subscription, TaskFeed};
pub use store::TaskStore;
pub use suggest::{drafts_from, SuggestClient};
pub use view::{project, SortKey, StatusFilter, TaskPage, TaskQuery};
