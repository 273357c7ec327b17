use serde::{Deserialize, Serialize};

use crate::models::{Task, UserId};

/// Messages a client sends over the live-feed connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a live feed over the owner's task collection. The server answers
    /// with a `Snapshot` immediately and after every subsequent change.
    Subscribe { owner_id: UserId },

    // Heartbeat
    Ping,
}

/// Messages the feed pushes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full current task set, replacing (not diffing) the previous one.
    Snapshot { tasks: Vec<Task> },

    Error { message: String },

    // Heartbeat
    Pong,
}
