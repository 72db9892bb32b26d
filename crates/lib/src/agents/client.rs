//! HTTP client for the agent service REST API (threads, messages, runs).
//!
//! All paths are relative to the project endpoint and carry the `api-version`
//! query parameter. Authentication is a bearer token supplied by config/env.

use crate::agents::types::{
    Agent, CreateMessageRequest, CreateRunRequest, ListOrder, MessagePage, Run, RunStatus, Thread,
    ThreadMessage,
};
use crate::agents::{AgentService, AgentServiceError};
use crate::config::{self, Config};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_API_VERSION: &str = "v1";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Client for the hosted agent service.
#[derive(Clone)]
pub struct AgentServiceClient {
    endpoint: String,
    api_version: String,
    token: Option<String>,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl AgentServiceClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            token,
            poll_interval: DEFAULT_POLL_INTERVAL,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config (endpoint, token, api version, poll interval; env overrides applied).
    pub fn from_config(config: &Config) -> Result<Self, AgentServiceError> {
        let endpoint = config::resolve_agent_endpoint(config).ok_or_else(|| {
            AgentServiceError::NotConfigured(
                "agent endpoint missing (set agent.endpoint or RELAY_AGENT_ENDPOINT)".to_string(),
            )
        })?;
        let api_version = config.agent.api_version.trim();
        Ok(Self::new(endpoint, config::resolve_agent_token(config))
            .with_api_version(if api_version.is_empty() {
                DEFAULT_API_VERSION
            } else {
                api_version
            })
            .with_poll_interval(Duration::from_millis(config.agent.poll_interval_ms)))
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .query(&[("api-version", self.api_version.as_str())]);
        match self.token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, AgentServiceError> {
        let res = builder.send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentServiceError::Api { status, body });
        }
        Ok(res.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AgentServiceError> {
        self.send(self.request(reqwest::Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AgentServiceError> {
        self.send(self.request(reqwest::Method::POST, path).json(body))
            .await
    }

    /// GET /threads/{thread_id}/runs/{run_id}
    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AgentServiceError> {
        self.get(&format!("threads/{}/runs/{}", thread_id, run_id))
            .await
    }

    /// POST /threads/{thread_id}/runs — start a run without waiting for it.
    pub async fn create_run(
        &self,
        thread_id: &str,
        agent_id: &str,
    ) -> Result<Run, AgentServiceError> {
        self.post(
            &format!("threads/{}/runs", thread_id),
            &CreateRunRequest {
                assistant_id: agent_id,
            },
        )
        .await
    }

    /// POST /threads/{thread_id}/runs/{run_id}/cancel
    pub async fn cancel_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Run, AgentServiceError> {
        self.post(
            &format!("threads/{}/runs/{}/cancel", thread_id, run_id),
            &serde_json::json!({}),
        )
        .await
    }
}

#[async_trait]
impl AgentService for AgentServiceClient {
    /// GET /assistants/{agent_id}
    async fn get_agent(&self, agent_id: &str) -> Result<Agent, AgentServiceError> {
        self.get(&format!("assistants/{}", agent_id)).await
    }

    /// POST /threads
    async fn create_thread(&self) -> Result<Thread, AgentServiceError> {
        self.post("threads", &serde_json::json!({})).await
    }

    /// POST /threads/{thread_id}/messages with role "user".
    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, AgentServiceError> {
        self.post(
            &format!("threads/{}/messages", thread_id),
            &CreateMessageRequest {
                role: "user",
                content,
            },
        )
        .await
    }

    /// Create a run and poll it until it reaches a terminal status.
    /// A run waiting for tool outputs is cancelled since no local tools are registered;
    /// polling then continues through `cancelling` until the service reports `cancelled`.
    async fn create_and_process_run(
        &self,
        thread_id: &str,
        agent_id: &str,
    ) -> Result<Run, AgentServiceError> {
        let mut run = self.create_run(thread_id, agent_id).await?;
        log::debug!("agents: run {} created with status {}", run.id, run.status);
        while run.status.is_pending() {
            tokio::time::sleep(self.poll_interval).await;
            run = self.get_run(thread_id, &run.id).await?;
            if run.status == RunStatus::RequiresAction {
                let action = run
                    .required_action
                    .as_ref()
                    .map(|a| a.typ.as_str())
                    .unwrap_or("unknown");
                log::warn!(
                    "agents: run {} requires action ({}) but no tools are available; cancelling",
                    run.id,
                    action
                );
                run = self.cancel_run(thread_id, &run.id).await?;
            }
        }
        log::debug!("agents: run {} finished with status {}", run.id, run.status);
        Ok(run)
    }

    /// GET /threads/{thread_id}/messages?order=..., following pagination until exhausted.
    async fn list_messages(
        &self,
        thread_id: &str,
        order: ListOrder,
    ) -> Result<Vec<ThreadMessage>, AgentServiceError> {
        let path = format!("threads/{}/messages", thread_id);
        let mut messages = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut builder = self
                .request(reqwest::Method::GET, &path)
                .query(&[("order", order.as_query())]);
            if let Some(ref cursor) = after {
                builder = builder.query(&[("after", cursor.as_str())]);
            }
            let page: MessagePage = self.send(builder).await?;
            let fetched = page.data.len();
            messages.extend(page.data);
            match page.last_id {
                Some(last) if page.has_more && fetched > 0 => after = Some(last),
                _ => break,
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let client = AgentServiceClient::new("https://example.test/api/projects/p/", None);
        assert_eq!(client.endpoint(), "https://example.test/api/projects/p");
        assert_eq!(
            client.url("/threads/t1/messages"),
            "https://example.test/api/projects/p/threads/t1/messages"
        );
    }

    #[test]
    fn from_config_requires_endpoint() {
        if std::env::var("RELAY_AGENT_ENDPOINT").is_ok() {
            return;
        }
        let err = AgentServiceClient::from_config(&Config::default())
            .err()
            .expect("missing endpoint must fail");
        assert!(matches!(err, AgentServiceError::NotConfigured(_)));
    }
}
