//! Chat turn: post the user message, run the agent, resolve the reply.
//!
//! Every outcome, including failures, becomes a [`ChatReply`] with user-visible
//! text; a failed turn never ends the session.

use crate::agents::{AgentService, AgentServiceError, ListOrder, Run, RunStatus, Thread};
use crate::resolver::{self, ResolveError};

/// Step name reported once the user message is in the thread.
pub const STEP_MESSAGE_POSTED: &str = "🤔 Thinking...";
/// Step name reported once the run has reached a terminal state.
pub const STEP_RUN_FINISHED: &str = "🔄 Processing with agent...";

const PREVIEW_CHARS: usize = 50;

/// Progress notice shown to the user while a turn is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStep {
    pub name: String,
    pub output: String,
}

/// Outcome of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// Reply text from the agent (one or more joined messages).
    Assistant { text: String, replies: usize },
    /// The run ended with status failed; detail from the service when present.
    RunFailed { detail: Option<String> },
    /// The run finished but no reply text could be found.
    NoResponse,
    /// The session has no thread (e.g. chat before connect).
    NoActiveThread,
    /// Listing or resolving messages after the run failed.
    ProcessingError(String),
    /// Posting the message or running the agent failed.
    Error(String),
}

impl ChatReply {
    /// Text to show the user.
    pub fn text(&self) -> String {
        match self {
            ChatReply::Assistant { text, .. } => text.clone(),
            ChatReply::RunFailed { detail: Some(d) } => format!("❌ **Run failed:** {}", d),
            ChatReply::RunFailed { detail: None } => "❌ **Run failed:** Unknown error".to_string(),
            ChatReply::NoResponse => {
                "❌ **Error:** No response received from the assistant.".to_string()
            }
            ChatReply::NoActiveThread => {
                "❌ **Error:** No active thread found. Please refresh the page.".to_string()
            }
            ChatReply::ProcessingError(e) => format!("❌ **Error in message processing:** {}", e),
            ChatReply::Error(e) => format!("❌ **Error:** {}", e),
        }
    }

    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatReply::Assistant { .. } => "assistant",
            ChatReply::RunFailed { .. } => "runFailed",
            ChatReply::NoResponse => "noResponse",
            ChatReply::NoActiveThread => "noActiveThread",
            ChatReply::ProcessingError(_) => "processingError",
            ChatReply::Error(_) => "error",
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, ChatReply::Assistant { .. })
    }
}

/// Greeting sent when a session starts.
pub fn welcome_text(display_name: &str, thread_id: &str) -> String {
    format!(
        "🤖 **{} Ready!**\n\nI'm connected to your agent and ready to help. Thread ID: `{}`\n\nFeel free to ask me anything!",
        display_name, thread_id
    )
}

/// First `PREVIEW_CHARS` characters of the user message.
fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Create the thread for a new session.
pub async fn start_thread<S: AgentService + ?Sized>(
    service: &S,
) -> Result<Thread, AgentServiceError> {
    let thread = service.create_thread().await?;
    log::info!("chat: created thread {}", thread.id);
    Ok(thread)
}

/// Handle one user message against `thread_id`. Reports progress through `on_step`.
pub async fn handle_message<S: AgentService + ?Sized>(
    service: &S,
    agent_id: &str,
    thread_id: &str,
    text: &str,
    on_step: &mut (dyn FnMut(ChatStep) + Send),
) -> ChatReply {
    match run_turn(service, agent_id, thread_id, text, on_step).await {
        Ok(reply) => reply,
        Err(e) => {
            log::warn!("chat: turn on thread {} failed: {}", thread_id, e);
            ChatReply::Error(e.to_string())
        }
    }
}

async fn run_turn<S: AgentService + ?Sized>(
    service: &S,
    agent_id: &str,
    thread_id: &str,
    text: &str,
    on_step: &mut (dyn FnMut(ChatStep) + Send),
) -> Result<ChatReply, AgentServiceError> {
    service.create_message(thread_id, text).await?;
    on_step(ChatStep {
        name: STEP_MESSAGE_POSTED.to_string(),
        output: format!("User message created: {}...", preview(text)),
    });

    let run = service.create_and_process_run(thread_id, agent_id).await?;
    on_step(ChatStep {
        name: STEP_RUN_FINISHED.to_string(),
        output: format!("Run status: {}", run.status),
    });

    if run.status == RunStatus::Failed {
        let detail = run.error_detail();
        log::info!(
            "chat: run {} failed: {}",
            run.id,
            detail.as_deref().unwrap_or("unknown error")
        );
        return Ok(ChatReply::RunFailed { detail });
    }

    match reply_for_run(service, thread_id, &run).await {
        Ok(reply) => Ok(reply),
        Err(e) => {
            log::warn!("chat: processing run {} output failed: {}", run.id, e);
            Ok(ChatReply::ProcessingError(e.to_string()))
        }
    }
}

async fn reply_for_run<S: AgentService + ?Sized>(
    service: &S,
    thread_id: &str,
    run: &Run,
) -> Result<ChatReply, AgentServiceError> {
    if let Some(text) = run.direct_result() {
        log::debug!("chat: run {} carried a direct result", run.id);
        return Ok(ChatReply::Assistant { text, replies: 1 });
    }

    let messages = service.list_messages(thread_id, ListOrder::Descending).await?;
    log::debug!("chat: thread {} has {} messages", thread_id, messages.len());
    match resolver::resolve(&messages) {
        Ok(resolution) => {
            log::info!(
                "chat: run {} produced {} reply message(s), {} chars ({:?})",
                run.id,
                resolution.replies,
                resolution.text.chars().count(),
                resolution.strategy
            );
            Ok(ChatReply::Assistant {
                text: resolution.text,
                replies: resolution.replies,
            })
        }
        Err(ResolveError::NoResponseFound) => {
            log::info!("chat: run {} ({}) left no reply", run.id, run.status);
            Ok(ChatReply::NoResponse)
        }
    }
}
