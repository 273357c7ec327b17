/// SQL for the local cache store.
pub struct Queries;

impl Queries {
    /// Cache schema: one row per task plus the pending-operation queue.
    pub const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            priority TEXT NOT NULL DEFAULT 'low',
            due_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            sync_state TEXT NOT NULL DEFAULT 'synced',
            CHECK (priority IN ('low', 'medium', 'high')),
            CHECK (sync_state IN ('synced', 'pending_create', 'pending_update', 'pending_delete'))
        );

        CREATE TABLE IF NOT EXISTS pending_ops (
            op_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            task_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            payload JSON NOT NULL,
            enqueued_at TEXT NOT NULL,
            edit_seq INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            CHECK (kind IN ('create', 'update', 'delete'))
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_owner_id ON tasks(owner_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_sync_state ON tasks(sync_state);
        CREATE INDEX IF NOT EXISTS idx_pending_ops_task_id ON pending_ops(task_id);
        CREATE INDEX IF NOT EXISTS idx_pending_ops_enqueued_at ON pending_ops(enqueued_at);
    "#;

    // Task queries
    pub const UPSERT_TASK: &'static str = r#"
        INSERT INTO tasks (
            id, owner_id, title, completed, priority,
            due_date, created_at, updated_at, sync_state
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            completed = excluded.completed,
            priority = excluded.priority,
            due_date = excluded.due_date,
            updated_at = excluded.updated_at,
            sync_state = excluded.sync_state
    "#;

    pub const GET_TASK: &'static str = r#"
        SELECT id, owner_id, title, completed, priority,
               due_date, created_at, updated_at, sync_state
        FROM tasks
        WHERE id = ?1
    "#;

    pub const LIST_TASKS: &'static str = r#"
        SELECT id, owner_id, title, completed, priority,
               due_date, created_at, updated_at, sync_state
        FROM tasks
        WHERE owner_id = ?1
        ORDER BY created_at ASC, id ASC
    "#;

    pub const DELETE_TASK: &'static str = "DELETE FROM tasks WHERE id = ?1";

    pub const DELETE_OWNER_TASKS: &'static str = "DELETE FROM tasks WHERE owner_id = ?1";

    /// Provisional-to-server id swap once a create confirms.
    pub const RENAME_TASK: &'static str = "UPDATE tasks SET id = ?2 WHERE id = ?1";

    // Pending-operation queue queries
    pub const INSERT_PENDING: &'static str = r#"
        INSERT INTO pending_ops (op_id, owner_id, task_id, kind, payload, enqueued_at, edit_seq, attempts)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    "#;

    pub const UPDATE_PENDING: &'static str = r#"
        UPDATE pending_ops
        SET kind = ?2, payload = ?3, edit_seq = ?4, attempts = ?5
        WHERE op_id = ?1
    "#;

    pub const DELETE_PENDING: &'static str = "DELETE FROM pending_ops WHERE op_id = ?1";

    /// Scoped to the owner: a cache file that still holds another user's
    /// queue must not replay it under this owner's session.
    pub const LIST_PENDING: &'static str = r#"
        SELECT op_id, owner_id, task_id, kind, payload, enqueued_at, edit_seq, attempts
        FROM pending_ops
        WHERE owner_id = ?1
        ORDER BY enqueued_at ASC, edit_seq ASC
    "#;

    pub const RENAME_PENDING: &'static str =
        "UPDATE pending_ops SET task_id = ?2 WHERE task_id = ?1";
}
