use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use todosync_client::{drafts_from, HttpRemote, RemoteTasks, SuggestClient};
use todosync_core::{Priority, RemoteError, TaskDraft, TaskFields, TaskId, UserId};

fn remote_for(server: &MockServer) -> HttpRemote {
    HttpRemote::new(&server.uri(), "ws://localhost:1").unwrap()
}

#[tokio::test]
async fn test_create_posts_draft_and_returns_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/u1/tasks"))
        .and(body_json(json!({
            "title": "Buy milk",
            "completed": false,
            "priority": "low"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "t1",
            "owner_id": "u1",
            "title": "Buy milk",
            "completed": false,
            "priority": "low",
            "created_at": "2026-08-29T10:00:00Z",
            "updated_at": "2026-08-29T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    let task = remote
        .create(&UserId::from("u1"), &TaskDraft::new("Buy milk"))
        .await
        .unwrap();
    assert_eq!(task.id, TaskId::from("t1"));
    assert_eq!(task.title, "Buy milk");
}

#[tokio::test]
async fn test_update_patches_changed_fields_only() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/users/u1/tasks/t1"))
        .and(body_json(json!({ "completed": true })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    remote
        .update(&UserId::from("u1"), &TaskId::from("t1"), &TaskFields::completed(true))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_hits_task_url() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/users/u1/tasks/t1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    remote
        .delete(&UserId::from("u1"), &TaskId::from("t1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_status_codes_map_to_remote_errors() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/users/u1/tasks/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/users/u1/tasks/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/users/u1/tasks/bad"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    let owner = UserId::from("u1");

    assert!(matches!(
        remote.delete(&owner, &TaskId::from("gone")).await,
        Err(RemoteError::NotFound(id)) if id == TaskId::from("gone")
    ));
    assert!(matches!(
        remote.delete(&owner, &TaskId::from("flaky")).await,
        Err(RemoteError::Unavailable(_))
    ));
    assert!(matches!(
        remote.delete(&owner, &TaskId::from("bad")).await,
        Err(RemoteError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_suggest_turns_prompt_into_drafts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/suggest"))
        .and(body_json(json!({ "prompt": "plan a weekend trip" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": ["Book hotel", "  Pack bags  ", ""]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SuggestClient::new(&format!("{}/suggest", server.uri())).unwrap();
    let titles = client.suggest("plan a weekend trip").await.unwrap();
    // Blank suggestions are dropped, the rest trimmed.
    assert_eq!(titles, vec!["Book hotel", "Pack bags"]);

    let drafts = drafts_from(titles);
    assert_eq!(drafts.len(), 2);
    assert!(drafts.iter().all(|d| d.priority == Priority::Low));
}

#[tokio::test]
async fn test_suggest_surfaces_service_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/suggest"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = SuggestClient::new(&format!("{}/suggest", server.uri())).unwrap();
    assert!(client.suggest("anything").await.is_err());
}
