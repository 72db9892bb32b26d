//! Response resolver: turn a thread's newest-first message list into the reply text for the latest turn.
//!
//! Primary pass: walk from the newest message collecting assistant messages
//! until the user message that triggered the run. When that user message is
//! the newest entry (the service orders by second-resolution timestamps, so a
//! reply can tie with it), it is skipped and collection continues down to the
//! previous user message. Fallback pass (only when the primary finds nothing):
//! the first few assistant messages anywhere near the top of the thread.

use crate::agents::ThreadMessage;
use crate::extract::{extract_text, try_extract_text, FALLBACK_EXTRACTORS, TURN_EXTRACTORS};

/// Separator between joined assistant replies.
pub const REPLY_SEPARATOR: &str = "\n\n---\n\n";

/// Messages examined by the fallback pass.
pub const FALLBACK_SCAN_LIMIT: usize = 10;

/// Replies kept by the fallback pass.
pub const FALLBACK_MAX_REPLIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no response received from the assistant")]
    NoResponseFound,
}

/// Which pass produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    LatestTurn,
    Fallback,
}

/// Joined reply text plus how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    pub replies: usize,
    pub strategy: Strategy,
}

/// Resolve the reply for the latest turn. `messages` must be newest-first.
pub fn resolve(messages: &[ThreadMessage]) -> Result<Resolution, ResolveError> {
    let replies = latest_turn_replies(messages);
    if !replies.is_empty() {
        log::debug!("resolver: {} assistant replies in latest turn", replies.len());
        return Ok(Resolution {
            text: replies.join(REPLY_SEPARATOR),
            replies: replies.len(),
            strategy: Strategy::LatestTurn,
        });
    }

    log::debug!("resolver: no replies in latest turn, trying fallback");
    let replies = fallback_replies(messages);
    if replies.is_empty() {
        return Err(ResolveError::NoResponseFound);
    }
    log::debug!("resolver: fallback found {} replies", replies.len());
    Ok(Resolution {
        text: replies.join(REPLY_SEPARATOR),
        replies: replies.len(),
        strategy: Strategy::Fallback,
    })
}

/// Assistant texts between the newest message and the previous turn, oldest first.
fn latest_turn_replies(messages: &[ThreadMessage]) -> Vec<String> {
    let mut replies = Vec::new();
    let mut found_user_message = false;
    let mut seen_assistant = false;
    for (i, msg) in messages.iter().enumerate() {
        log::debug!(
            "resolver: message {}: role={}, created_at={}",
            i,
            msg.role.as_str(),
            msg.created_at_utc()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        );
        if msg.is_user() {
            if found_user_message || seen_assistant {
                break;
            }
            found_user_message = true;
            continue;
        }
        if !msg.is_assistant() {
            continue;
        }
        seen_assistant = true;
        match extract_text(msg, TURN_EXTRACTORS) {
            Some(text) => replies.push(text),
            None => log::debug!(
                "resolver: could not extract content from assistant message {} (attributes: {:?})",
                i,
                msg.extra.keys().collect::<Vec<_>>()
            ),
        }
    }
    replies.reverse();
    replies
}

/// Up to FALLBACK_MAX_REPLIES assistant texts among the first FALLBACK_SCAN_LIMIT messages, in scan order.
/// A message with a malformed text block is skipped.
fn fallback_replies(messages: &[ThreadMessage]) -> Vec<String> {
    messages
        .iter()
        .take(FALLBACK_SCAN_LIMIT)
        .filter(|m| m.is_assistant())
        .filter_map(|m| match try_extract_text(m, FALLBACK_EXTRACTORS) {
            Ok(text) => text,
            Err(e) => {
                log::debug!("resolver: fallback skipped message {}: {}", m.id, e);
                None
            }
        })
        .take(FALLBACK_MAX_REPLIES)
        .collect()
}
