use thiserror::Error;
use todosync_core::{RemoteError, ValidationError};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cache store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("live feed error: {0}")]
    Feed(String),

    #[error("corrupt cache row: {0}")]
    Corrupt(String),

    #[error("sync engine has shut down")]
    EngineClosed,
}
