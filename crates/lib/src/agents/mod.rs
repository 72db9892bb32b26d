//! Hosted agent service: wire types, the `AgentService` seam, and the HTTP client.
//!
//! The chat handler and gateway only depend on the trait, so the service can be
//! swapped for an in-process stand-in.

mod client;
mod types;

pub use client::AgentServiceClient;
pub use types::{
    Agent, ListOrder, MessageRole, RequiredAction, Run, RunError, RunStatus, Thread,
    ThreadMessage,
};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum AgentServiceError {
    #[error("agent service request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("agent service api error: {status} {body}")]
    Api { status: u16, body: String },
    #[error("agent service not configured: {0}")]
    NotConfigured(String),
}

/// Operations the chat flow needs from the agent service.
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Look up an agent definition by id.
    async fn get_agent(&self, agent_id: &str) -> Result<Agent, AgentServiceError>;

    /// Create an empty conversation thread.
    async fn create_thread(&self) -> Result<Thread, AgentServiceError>;

    /// Post a user message into a thread.
    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, AgentServiceError>;

    /// Run the agent against the thread and wait until the run reaches a terminal state.
    async fn create_and_process_run(
        &self,
        thread_id: &str,
        agent_id: &str,
    ) -> Result<Run, AgentServiceError>;

    /// All messages of a thread in the given order.
    async fn list_messages(
        &self,
        thread_id: &str,
        order: ListOrder,
    ) -> Result<Vec<ThreadMessage>, AgentServiceError>;
}
