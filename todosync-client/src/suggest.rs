//! Client for the task-suggestion endpoint: a free-text prompt goes in, a
//! short list of suggested task titles comes back. Suggestions become plain
//! drafts (lowest priority, no due date) that callers feed to the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use todosync_core::{Priority, TaskDraft, ValidationError};

use crate::errors::{ClientError, ClientResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Serialize)]
struct SuggestRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    tasks: Vec<String>,
}

pub struct SuggestClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SuggestClient {
    pub fn new(endpoint: &str) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Feed(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    /// Ask the service for task titles matching a free-text prompt.
    pub async fn suggest(&self, prompt: &str) -> ClientResult<Vec<String>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }
        tracing::debug!(prompt_len = prompt.len(), "requesting task suggestions");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&SuggestRequest { prompt })
            .send()
            .await
            .map_err(|e| ClientError::Feed(format!("suggestion request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ClientError::Feed(format!(
                "suggestion service returned {}",
                response.status()
            )));
        }

        let body: SuggestResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Feed(format!("bad suggestion response: {e}")))?;

        let titles: Vec<String> = body
            .tasks
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        tracing::debug!(count = titles.len(), "suggestions received");
        Ok(titles)
    }
}

/// Turn suggestion titles into addable drafts. Suggested tasks always start
/// uncompleted at low priority.
pub fn drafts_from(titles: Vec<String>) -> Vec<TaskDraft> {
    titles
        .into_iter()
        .map(|title| TaskDraft::new(title).with_priority(Priority::Low))
        .collect()
}
