//! Gateway: HTTP + WebSocket chat front-end.
//!
//! Single port serves HTTP and WebSocket. Protocol: `connect` starts a chat
//! session (one agent thread per connection); then `chat` requests, each
//! answered after step events, plus `health` and `status`.

mod protocol;
mod server;

pub use protocol::{
    ChatParams, ChatPayload, ConnectParams, HelloOk, HelloSession, WsEvent, WsRequest, WsResponse,
};
pub use server::{run_gateway, serve, serve_with_shutdown, GatewayState};
