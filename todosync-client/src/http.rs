//! REST client for the hosted task service. Point writes go over HTTP; the
//! live feed (see `feed`) runs over a WebSocket.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use todosync_core::{RemoteError, Task, TaskDraft, TaskFields, TaskId, UserId};

use crate::feed;
use crate::remote::{RemoteTasks, TaskFeed};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    ws_url: String,
    auth_token: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: &str, ws_url: &str) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.to_string(),
            auth_token: None,
        })
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    fn collection_url(&self, owner_id: &UserId) -> String {
        format!("{}/users/{}/tasks", self.base_url, owner_id)
    }

    fn task_url(&self, owner_id: &UserId, id: &TaskId) -> String {
        format!("{}/users/{}/tasks/{}", self.base_url, owner_id, id)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(
        &self,
        response: reqwest::Response,
        id: Option<&TaskId>,
    ) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, id))
    }
}

#[async_trait]
impl RemoteTasks for HttpRemote {
    async fn create(&self, owner_id: &UserId, draft: &TaskDraft) -> Result<Task, RemoteError> {
        let req = self.client.post(self.collection_url(owner_id)).json(draft);
        let response = self.authorize(req).send().await.map_err(transport_error)?;
        let response = self.check(response, None).await?;

        response
            .json::<Task>()
            .await
            .map_err(|e| RemoteError::Rejected(format!("malformed create response: {}", e)))
    }

    async fn update(
        &self,
        owner_id: &UserId,
        id: &TaskId,
        fields: &TaskFields,
    ) -> Result<(), RemoteError> {
        let req = self.client.patch(self.task_url(owner_id, id)).json(fields);
        let response = self.authorize(req).send().await.map_err(transport_error)?;
        self.check(response, Some(id)).await?;
        Ok(())
    }

    async fn delete(&self, owner_id: &UserId, id: &TaskId) -> Result<(), RemoteError> {
        let req = self.client.delete(self.task_url(owner_id, id));
        let response = self.authorize(req).send().await.map_err(transport_error)?;
        self.check(response, Some(id)).await?;
        Ok(())
    }

    async fn subscribe(&self, owner_id: &UserId) -> Result<TaskFeed, RemoteError> {
        feed::connect(&self.ws_url, owner_id).await
    }
}

/// Network-level failures are transient by definition.
fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Unavailable(err.to_string())
}

fn classify_status(status: StatusCode, body: &str, id: Option<&TaskId>) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => match id {
            Some(id) => RemoteError::NotFound(id.clone()),
            None => RemoteError::Rejected(format!("{}: {}", status, body)),
        },
        s if s.is_server_error() => RemoteError::Unavailable(format!("{}: {}", s, body)),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Unavailable(format!("{}: {}", status, body))
        }
        s => RemoteError::Rejected(format!("{}: {}", s, body)),
    }
}
