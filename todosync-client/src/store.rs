use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, SqlitePool};
use uuid::Uuid;

use todosync_core::{
    OperationPayload, PendingOperation, Priority, SyncState, Task, TaskId, UserId,
};

use crate::errors::{ClientError, ClientResult};
use crate::queries::Queries;

/// Durable per-device mirror of the authoritative task set plus the queue of
/// writes not yet confirmed remotely. No network access; survives restarts.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub async fn new(database_url: &str) -> ClientResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create the cache schema if missing.
    pub async fn init(&self) -> ClientResult<()> {
        self.pool.execute(Queries::SCHEMA).await?;
        Ok(())
    }

    pub async fn get_task(&self, id: &TaskId) -> ClientResult<Option<Task>> {
        let row = sqlx::query(Queries::GET_TASK)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| parse_task(&r)).transpose()
    }

    pub async fn load_tasks(&self, owner_id: &UserId) -> ClientResult<Vec<Task>> {
        let rows = sqlx::query(Queries::LIST_TASKS)
            .bind(owner_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(parse_task).collect()
    }

    pub async fn save_task(&self, task: &Task) -> ClientResult<()> {
        sqlx::query(Queries::UPSERT_TASK)
            .bind(task.id.as_str())
            .bind(task.owner_id.as_str())
            .bind(&task.title)
            .bind(task.completed)
            .bind(task.priority.to_string())
            .bind(task.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
            .bind(task.created_at.to_rfc3339())
            .bind(task.updated_at.to_rfc3339())
            .bind(task.sync_state.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Replace the owner's whole cached set in one transaction, preserving
    /// nothing from the previous rows.
    pub async fn save_all(&self, owner_id: &UserId, tasks: &[Task]) -> ClientResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(Queries::DELETE_OWNER_TASKS)
            .bind(owner_id.as_str())
            .execute(&mut *tx)
            .await?;

        for task in tasks {
            sqlx::query(Queries::UPSERT_TASK)
                .bind(task.id.as_str())
                .bind(task.owner_id.as_str())
                .bind(&task.title)
                .bind(task.completed)
                .bind(task.priority.to_string())
                .bind(task.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
                .bind(task.created_at.to_rfc3339())
                .bind(task.updated_at.to_rfc3339())
                .bind(task.sync_state.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_task(&self, id: &TaskId) -> ClientResult<()> {
        sqlx::query(Queries::DELETE_TASK)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Swap a provisional id for the server-assigned one, in both the task
    /// row and any queued operations that reference it. A row already cached
    /// under the new id (a feed snapshot can deliver the server copy before
    /// the create confirmation lands) is displaced by the renamed one.
    pub async fn rename_task(&self, old_id: &TaskId, new_id: &TaskId) -> ClientResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(Queries::DELETE_TASK)
            .bind(new_id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(Queries::RENAME_TASK)
            .bind(old_id.as_str())
            .bind(new_id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(Queries::RENAME_PENDING)
            .bind(old_id.as_str())
            .bind(new_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn enqueue_pending(&self, op: &PendingOperation) -> ClientResult<()> {
        sqlx::query(Queries::INSERT_PENDING)
            .bind(op.op_id.to_string())
            .bind(op.owner_id.as_str())
            .bind(op.task_id.as_str())
            .bind(op.kind().to_string())
            .bind(serde_json::to_string(&op.payload)?)
            .bind(op.enqueued_at.to_rfc3339())
            .bind(op.edit_seq as i64)
            .bind(op.attempts as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Rewrite a queued operation after a coalesced edit or retry bump.
    pub async fn update_pending(&self, op: &PendingOperation) -> ClientResult<()> {
        sqlx::query(Queries::UPDATE_PENDING)
            .bind(op.op_id.to_string())
            .bind(op.kind().to_string())
            .bind(serde_json::to_string(&op.payload)?)
            .bind(op.edit_seq as i64)
            .bind(op.attempts as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn dequeue_pending(&self, op_id: &Uuid) -> ClientResult<()> {
        sqlx::query(Queries::DELETE_PENDING)
            .bind(op_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_pending(&self, owner_id: &UserId) -> ClientResult<Vec<PendingOperation>> {
        let rows = sqlx::query(Queries::LIST_PENDING)
            .bind(owner_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(parse_pending).collect()
    }
}

fn parse_task(row: &SqliteRow) -> ClientResult<Task> {
    let id: String = row.get("id");
    let owner_id: String = row.get("owner_id");
    let title: String = row.get("title");
    let completed: bool = row.get("completed");
    let priority: String = row.get("priority");
    let due_date: Option<String> = row.get("due_date");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let sync_state: String = row.get("sync_state");

    Ok(Task {
        id: TaskId::from(id),
        owner_id: UserId::from(owner_id),
        title,
        completed,
        priority: Priority::from_str(&priority)
            .map_err(|_| ClientError::Corrupt(format!("priority {:?}", priority)))?,
        due_date: due_date
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .map_err(|_| ClientError::Corrupt(format!("due_date {:?}", d)))
            })
            .transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        sync_state: SyncState::from_str(&sync_state)
            .map_err(|_| ClientError::Corrupt(format!("sync_state {:?}", sync_state)))?,
    })
}

fn parse_pending(row: &SqliteRow) -> ClientResult<PendingOperation> {
    let op_id: String = row.get("op_id");
    let owner_id: String = row.get("owner_id");
    let task_id: String = row.get("task_id");
    let payload: String = row.get("payload");
    let enqueued_at: String = row.get("enqueued_at");
    let edit_seq: i64 = row.get("edit_seq");
    let attempts: i64 = row.get("attempts");

    let payload: OperationPayload = serde_json::from_str(&payload)?;

    Ok(PendingOperation {
        op_id: Uuid::parse_str(&op_id)
            .map_err(|_| ClientError::Corrupt(format!("op_id {:?}", op_id)))?,
        owner_id: UserId::from(owner_id),
        task_id: TaskId::from(task_id),
        payload,
        enqueued_at: parse_timestamp(&enqueued_at)?,
        edit_seq: edit_seq as u64,
        attempts: attempts as u32,
    })
}

fn parse_timestamp(raw: &str) -> ClientResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ClientError::Corrupt(format!("timestamp {:?}", raw)))
}
