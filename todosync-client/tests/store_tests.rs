mod common;

use chrono::NaiveDate;
use common::{make_task, setup_test_store};
use todosync_core::{
    OperationPayload, PendingOperation, Priority, SyncState, TaskDraft, TaskFields, TaskId, UserId,
};

#[tokio::test]
async fn test_task_round_trip() {
    let store = setup_test_store().await;

    let mut task = make_task("t1", "u1", "Buy milk");
    task.priority = Priority::High;
    task.due_date = NaiveDate::from_ymd_opt(2026, 9, 1);
    task.sync_state = SyncState::PendingUpdate;
    store.save_task(&task).await.unwrap();

    let loaded = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(loaded.title, "Buy milk");
    assert_eq!(loaded.priority, Priority::High);
    assert_eq!(loaded.due_date, NaiveDate::from_ymd_opt(2026, 9, 1));
    assert_eq!(loaded.sync_state, SyncState::PendingUpdate);

    assert!(store
        .get_task(&TaskId::from("missing"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_save_is_upsert() {
    let store = setup_test_store().await;

    let mut task = make_task("t1", "u1", "First pass");
    store.save_task(&task).await.unwrap();
    task.title = "Second pass".to_string();
    task.completed = true;
    store.save_task(&task).await.unwrap();

    let tasks = store.load_tasks(&UserId::from("u1")).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Second pass");
    assert!(tasks[0].completed);
}

#[tokio::test]
async fn test_load_tasks_scoped_to_owner() {
    let store = setup_test_store().await;

    store.save_task(&make_task("t1", "u1", "Mine")).await.unwrap();
    store
        .save_task(&make_task("t2", "u2", "Someone else's"))
        .await
        .unwrap();

    let tasks = store.load_tasks(&UserId::from("u1")).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, TaskId::from("t1"));
}

#[tokio::test]
async fn test_save_all_replaces_owner_set() {
    let store = setup_test_store().await;
    let owner = UserId::from("u1");

    store.save_task(&make_task("stale", "u1", "Gone soon")).await.unwrap();
    store.save_task(&make_task("x", "u2", "Unrelated")).await.unwrap();

    store
        .save_all(
            &owner,
            &[make_task("a", "u1", "Fresh"), make_task("b", "u1", "Also fresh")],
        )
        .await
        .unwrap();

    let tasks = store.load_tasks(&owner).await.unwrap();
    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    // Other owners are untouched.
    assert_eq!(store.load_tasks(&UserId::from("u2")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pending_queue_order_and_lifecycle() {
    let store = setup_test_store().await;

    let owner = UserId::from("u1");
    let first = PendingOperation::new(
        owner.clone(),
        TaskId::from("t1"),
        OperationPayload::Create {
            draft: TaskDraft::new("Queued first"),
        },
        1,
    );
    let second = PendingOperation::new(
        owner.clone(),
        TaskId::from("t2"),
        OperationPayload::Update {
            fields: TaskFields::title("Queued second"),
        },
        2,
    );
    store.enqueue_pending(&first).await.unwrap();
    store.enqueue_pending(&second).await.unwrap();

    let pending = store.list_pending(&owner).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].op_id, first.op_id);
    assert_eq!(pending[1].op_id, second.op_id);
    assert_eq!(pending[0].payload, first.payload);

    // Coalesced edit: payload and sequence move, the slot stays.
    let mut updated = second.clone();
    updated.payload = OperationPayload::Delete;
    updated.edit_seq = 3;
    updated.attempts = 2;
    store.update_pending(&updated).await.unwrap();

    let pending = store.list_pending(&owner).await.unwrap();
    assert_eq!(pending[1].payload, OperationPayload::Delete);
    assert_eq!(pending[1].edit_seq, 3);
    assert_eq!(pending[1].attempts, 2);

    store.dequeue_pending(&first.op_id).await.unwrap();
    let pending = store.list_pending(&owner).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].op_id, second.op_id);
}

#[tokio::test]
async fn test_rename_covers_task_and_queue() {
    let store = setup_test_store().await;

    let mut task = make_task("local-abc", "u1", "Provisional");
    task.sync_state = SyncState::PendingCreate;
    store.save_task(&task).await.unwrap();

    let op = PendingOperation::new(
        UserId::from("u1"),
        TaskId::from("local-abc"),
        OperationPayload::Update {
            fields: TaskFields::completed(true),
        },
        5,
    );
    store.enqueue_pending(&op).await.unwrap();

    store
        .rename_task(&TaskId::from("local-abc"), &TaskId::from("t9"))
        .await
        .unwrap();

    assert!(store.get_task(&TaskId::from("local-abc")).await.unwrap().is_none());
    assert!(store.get_task(&TaskId::from("t9")).await.unwrap().is_some());
    let pending = store.list_pending(&UserId::from("u1")).await.unwrap();
    assert_eq!(pending[0].task_id, TaskId::from("t9"));
}

#[tokio::test]
async fn test_rename_displaces_existing_row_under_new_id() {
    let store = setup_test_store().await;

    // A snapshot can land the server's row before the create confirms;
    // the swap must still go through.
    let mut provisional = make_task("local-abc", "u1", "Edited locally");
    provisional.sync_state = SyncState::PendingCreate;
    store.save_task(&provisional).await.unwrap();
    store.save_task(&make_task("t9", "u1", "Server copy")).await.unwrap();

    store
        .rename_task(&TaskId::from("local-abc"), &TaskId::from("t9"))
        .await
        .unwrap();

    assert!(store.get_task(&TaskId::from("local-abc")).await.unwrap().is_none());
    let kept = store.get_task(&TaskId::from("t9")).await.unwrap().unwrap();
    assert_eq!(kept.title, "Edited locally");
    assert_eq!(store.load_tasks(&UserId::from("u1")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pending_queue_scoped_to_owner() {
    let store = setup_test_store().await;

    let mine = PendingOperation::new(
        UserId::from("u1"),
        TaskId::from("t1"),
        OperationPayload::Delete,
        1,
    );
    let theirs = PendingOperation::new(
        UserId::from("u2"),
        TaskId::from("t2"),
        OperationPayload::Delete,
        1,
    );
    store.enqueue_pending(&mine).await.unwrap();
    store.enqueue_pending(&theirs).await.unwrap();

    let pending = store.list_pending(&UserId::from("u1")).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].op_id, mine.op_id);
    assert_eq!(pending[0].owner_id, UserId::from("u1"));
}
