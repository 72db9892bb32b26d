//! relay core library: agent service client, reply resolution, chat sessions,
//! and the gateway used by the CLI.

pub mod agents;
pub mod chat;
pub mod config;
pub mod extract;
pub mod gateway;
pub mod init;
pub mod resolver;
pub mod session;
