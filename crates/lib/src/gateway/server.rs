//! Gateway HTTP + WebSocket server (single port).

use crate::agents::{Agent, AgentService, AgentServiceClient};
use crate::chat::{self, ChatReply, ChatStep};
use crate::config::{self, Config};
use crate::gateway::protocol::{
    ChatParams, ChatPayload, ConnectParams, HelloOk, HelloPolicy, HelloSession, WsEvent,
    WsRequest, WsResponse,
};
use crate::session::{Session, SessionStore};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};

const PROTOCOL_VERSION: u32 = 1;

/// Shared state for the gateway (config, sessions, agent service).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// When Some, WebSocket connect must provide params.auth.token matching this.
    pub required_token: Option<String>,
    /// Broadcasts events to connected clients (e.g. shutdown). Subscribers receive JSON event frames.
    pub event_tx: broadcast::Sender<String>,
    pub session_store: Arc<SessionStore>,
    /// Agent service client, constructed once at startup.
    pub service: Arc<dyn AgentService>,
    /// Agent resolved at startup; every run uses its id.
    pub agent: Arc<Agent>,
}

/// When auth mode is token and a token is configured, returns it for connect validation.
fn require_connect_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

/// Refuse a non-loopback bind unless token auth is configured.
fn check_bind_auth(config: &Config) -> Result<()> {
    let bind = config.gateway.bind.trim();
    if !config::is_loopback_bind(bind) {
        let token = config::resolve_gateway_token(config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or RELAY_GATEWAY_TOKEN)",
                bind
            );
        }
    }
    Ok(())
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Builds the agent service client from config and resolves the agent before listening.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    check_bind_auth(&config)?;
    let agent_id = config::resolve_agent_id(&config)
        .context("agent id missing (set agent.agentId or RELAY_AGENT_ID)")?;
    let client = AgentServiceClient::from_config(&config)?;
    let agent = client
        .get_agent(&agent_id)
        .await
        .with_context(|| format!("resolving agent {}", agent_id))?;
    log::info!(
        "using agent {} ({}) at {}",
        agent.id,
        agent.name.as_deref().unwrap_or("unnamed"),
        client.endpoint()
    );

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    serve(listener, config, Arc::new(client), agent).await
}

/// Serve the gateway on an already bound listener with the given service and agent.
/// Stops on SIGINT or SIGTERM.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    service: Arc<dyn AgentService>,
    agent: Agent,
) -> Result<()> {
    serve_with_shutdown(listener, config, service, agent, shutdown_signal()).await
}

/// Like [`serve`], but shuts down when `signal` completes. Connected clients
/// receive the `shutdown` event first.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    config: Config,
    service: Arc<dyn AgentService>,
    agent: Agent,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    check_bind_auth(&config)?;
    let (event_tx, _) = broadcast::channel(64);
    let state = GatewayState {
        required_token: require_connect_token(&config),
        config: Arc::new(config),
        event_tx: event_tx.clone(),
        session_store: Arc::new(SessionStore::new()),
        service,
        agent: Arc::new(agent),
    };

    let app = Router::new()
        .route("/", get(health_http))
        .route("/ws", get(ws_handler))
        .with_state(state);

    if let Ok(addr) = listener.local_addr() {
        log::info!("gateway listening on {}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            log::info!("shutdown signal received, broadcasting shutdown and draining connections");
            let _ = event_tx.send(to_frame(&WsEvent::shutdown()));
        })
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.config.gateway.port,
    }))
}

/// GET /ws upgrades to WebSocket. First request should be connect; we reply with hello-ok and a welcome.
async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn to_frame<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Queue a frame for the connection's writer task.
fn queue<T: Serialize>(out: &mpsc::UnboundedSender<String>, value: &T) {
    let _ = out.send(to_frame(value));
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let (closing_tx, mut closing_rx) = watch::channel(false);
    let forwarder = tokio::spawn(forward_events(
        state.event_tx.subscribe(),
        out_tx.clone(),
        closing_tx,
    ));
    let mut session: Option<Session> = None;

    loop {
        tokio::select! {
            biased;

            _ = closing_rx.changed() => break,
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(req): Result<WsRequest, _> = serde_json::from_str(&text) else { continue };
                if req.typ != "req" {
                    continue;
                }
                // Shutdown abandons the request in flight; a started run is left to the service.
                tokio::select! {
                    biased;

                    _ = closing_rx.changed() => break,
                    _ = handle_request(&state, &mut session, &out_tx, req) => {}
                }
            }
        }
    }

    forwarder.abort();
    let _ = forwarder.await;
    match session {
        Some(s) => {
            state.session_store.remove(&s.id).await;
            log::info!(
                "chat session {} ended after {}s (thread {})",
                s.id,
                (chrono::Utc::now() - s.created_at).num_seconds(),
                s.thread_id
            );
        }
        None => log::debug!("ws client disconnected before sending connect"),
    }
    drop(out_tx);
    let _ = writer.await;
}

/// Forward broadcast events to one connection. Sets `closing` once the
/// shutdown event has been queued, so the request loop stops even mid-turn.
async fn forward_events(
    mut event_rx: broadcast::Receiver<String>,
    out: mpsc::UnboundedSender<String>,
    closing: watch::Sender<bool>,
) {
    let shutdown_frame = to_frame(&WsEvent::shutdown());
    loop {
        match event_rx.recv().await {
            Ok(text) => {
                let is_shutdown = text == shutdown_frame;
                let _ = out.send(text);
                if is_shutdown {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::debug!("ws client lagged {} broadcast messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = closing.send(true);
}

/// Dispatch one request. Requests of a connection are handled one at a time.
async fn handle_request(
    state: &GatewayState,
    session: &mut Option<Session>,
    out: &mpsc::UnboundedSender<String>,
    req: WsRequest,
) {
    match req.method.as_str() {
        "connect" => handle_connect(state, session, out, req).await,
        "chat" => handle_chat(state, session.as_ref(), out, req).await,
        "health" => {
            let payload = json!({
                "runtime": "running",
                "protocol": PROTOCOL_VERSION,
            });
            queue(out, &WsResponse::ok(&req.id, payload));
        }
        "status" => {
            let auth_mode = if state.required_token.is_some() {
                "token"
            } else {
                "none"
            };
            let active_sessions = state.session_store.len().await;
            let payload = json!({
                "runtime": "running",
                "protocol": PROTOCOL_VERSION,
                "port": state.config.gateway.port,
                "bind": state.config.gateway.bind,
                "auth": auth_mode,
                "endpoint": config::resolve_agent_endpoint(&state.config),
                "agentId": state.agent.id,
                "agentName": state.agent.name,
                "agentModel": state.agent.model,
                "activeSessions": active_sessions,
                "sessionId": session.as_ref().map(|s| s.id.clone()),
                "sessionStartedAt": session.as_ref().map(|s| s.created_at.to_rfc3339()),
                "sessionAgeSecs": session
                    .as_ref()
                    .map(|s| (chrono::Utc::now() - s.created_at).num_seconds()),
                "date": chrono::Local::now().format("%Y-%m-%d").to_string(),
            });
            queue(out, &WsResponse::ok(&req.id, payload));
        }
        _ => {
            queue(out, &WsResponse::err(&req.id, format!("unknown method: {}", req.method)));
        }
    }
}

/// connect: check the token, start the session (new thread) and send the welcome.
async fn handle_connect(
    state: &GatewayState,
    session: &mut Option<Session>,
    out: &mpsc::UnboundedSender<String>,
    req: WsRequest,
) {
    let params: ConnectParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(_) => {
            queue(out, &WsResponse::err(&req.id, "invalid connect params"));
            return;
        }
    };
    if let Some(ref required) = state.required_token {
        let provided = params.auth.token.as_deref().unwrap_or("").trim();
        if provided.is_empty() {
            queue(
                out,
                &WsResponse::err(
                    &req.id,
                    "unauthorized: gateway token missing (set RELAY_GATEWAY_TOKEN or gateway.auth.token)",
                ),
            );
            return;
        }
        if provided != required {
            queue(out, &WsResponse::err(&req.id, "unauthorized: gateway token mismatch"));
            return;
        }
    }

    let started = if let Some(existing) = session.as_ref() {
        existing.clone()
    } else {
        let thread = match chat::start_thread(state.service.as_ref()).await {
            Ok(t) => t,
            Err(e) => {
                log::warn!("connect: creating thread failed: {}", e);
                queue(
                    out,
                    &WsResponse::err(&req.id, format!("failed to start chat session: {}", e)),
                );
                return;
            }
        };
        let created = state.session_store.create(thread.id).await;
        log::info!(
            "chat session {} started (thread {}, client {})",
            created.id,
            created.thread_id,
            params.client.id.as_deref().unwrap_or("unknown")
        );
        *session = Some(created.clone());
        created
    };

    let protocol = params
        .max_protocol
        .unwrap_or(PROTOCOL_VERSION)
        .min(PROTOCOL_VERSION);
    let hello = HelloOk {
        typ: "hello-ok".to_string(),
        protocol,
        policy: Some(HelloPolicy {
            tick_interval_ms: Some(15_000),
        }),
        session: HelloSession {
            session_id: started.id.clone(),
            thread_id: started.thread_id.clone(),
        },
    };
    queue(
        out,
        &WsResponse::ok(&req.id, serde_json::to_value(&hello).unwrap_or(json!({}))),
    );
    let welcome = chat::welcome_text(&state.config.agent.display_name, &started.thread_id);
    queue(out, &WsEvent::chat_message(&started.id, &welcome, None));
}

/// chat: run one turn on the session's thread, streaming step events, then reply.
async fn handle_chat(
    state: &GatewayState,
    session: Option<&Session>,
    out: &mpsc::UnboundedSender<String>,
    req: WsRequest,
) {
    let params: ChatParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(_) => {
            queue(out, &WsResponse::err(&req.id, "invalid chat params"));
            return;
        }
    };

    let Some(session) = session else {
        let reply = ChatReply::NoActiveThread;
        let payload = ChatPayload {
            reply: reply.text(),
            kind: reply.kind().to_string(),
            author: None,
            session_id: None,
            thread_id: None,
        };
        queue(
            out,
            &WsResponse::ok(&req.id, serde_json::to_value(&payload).unwrap_or(json!({}))),
        );
        return;
    };

    let step_out = out.clone();
    let session_id = session.id.clone();
    let mut on_step = move |step: ChatStep| {
        queue(
            &step_out,
            &WsEvent::chat_step(&session_id, &step.name, &step.output),
        );
    };
    let reply = chat::handle_message(
        state.service.as_ref(),
        &state.agent.id,
        &session.thread_id,
        &params.message,
        &mut on_step,
    )
    .await;

    let payload = ChatPayload {
        reply: reply.text(),
        kind: reply.kind().to_string(),
        author: reply
            .is_assistant()
            .then(|| state.config.agent.display_name.clone()),
        session_id: Some(session.id.clone()),
        thread_id: Some(session.thread_id.clone()),
    };
    queue(
        out,
        &WsResponse::ok(&req.id, serde_json::to_value(&payload).unwrap_or(json!({}))),
    );
}
