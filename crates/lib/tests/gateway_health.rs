//! Integration test: serve the gateway on a free port with an in-process agent service,
//! GET / for health, then drive a chat session over the WebSocket.
//! Does not require a hosted agent service. The server task is left running when the test ends.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use relay::agents::{
    Agent, AgentService, AgentServiceError, ListOrder, Run, Thread, ThreadMessage,
};
use relay::config::Config;
use relay::gateway;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// Echoes each user message back as the assistant reply.
#[derive(Default)]
struct EchoService {
    messages: Mutex<Vec<Value>>,
}

#[async_trait]
impl AgentService for EchoService {
    async fn get_agent(&self, agent_id: &str) -> Result<Agent, AgentServiceError> {
        Ok(test_agent(agent_id))
    }

    async fn create_thread(&self) -> Result<Thread, AgentServiceError> {
        Ok(serde_json::from_value(json!({ "id": "thread_test", "created_at": 1 })).unwrap())
    }

    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, AgentServiceError> {
        let mut messages = self.messages.lock().unwrap();
        let n = messages.len() as i64;
        let user = json!({
            "id": format!("msg_{}", n),
            "role": "user",
            "thread_id": thread_id,
            "created_at": 100 + n,
            "content": [{ "type": "text", "text": { "value": content } }]
        });
        let reply = json!({
            "id": format!("msg_{}", n + 1),
            "role": "assistant",
            "thread_id": thread_id,
            "created_at": 101 + n,
            "content": [{ "type": "text", "text": { "value": format!("echo: {}", content) } }]
        });
        messages.push(user.clone());
        messages.push(reply);
        Ok(serde_json::from_value(user).unwrap())
    }

    async fn create_and_process_run(
        &self,
        thread_id: &str,
        agent_id: &str,
    ) -> Result<Run, AgentServiceError> {
        Ok(serde_json::from_value(json!({
            "id": "run_test",
            "thread_id": thread_id,
            "assistant_id": agent_id,
            "status": "completed"
        }))
        .unwrap())
    }

    async fn list_messages(
        &self,
        _thread_id: &str,
        order: ListOrder,
    ) -> Result<Vec<ThreadMessage>, AgentServiceError> {
        let mut list: Vec<ThreadMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| serde_json::from_value(m.clone()).unwrap())
            .collect();
        if order == ListOrder::Descending {
            list.reverse();
        }
        Ok(list)
    }
}

fn test_agent(id: &str) -> Agent {
    Agent {
        id: id.to_string(),
        name: Some("Test Agent".to_string()),
        model: Some("gpt-4o".to_string()),
        instructions: None,
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn start_gateway(config: Config) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway listener");
    let port = listener.local_addr().expect("local_addr").port();
    let mut config = config;
    config.gateway.port = port;
    tokio::spawn(async move {
        let _ = gateway::serve(
            listener,
            config,
            Arc::new(EchoService::default()),
            test_agent("asst_test"),
        )
        .await;
    });
    port
}

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn send(ws: &mut Ws, id: &str, method: &str, params: Value) {
    let req = json!({ "type": "req", "id": id, "method": method, "params": params });
    ws.send(Message::Text(req.to_string()))
        .await
        .expect("send request");
}

/// Next JSON frame from the socket (text frames only).
async fn next_frame(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within 5s")
            .expect("socket open")
            .expect("frame ok");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("frame is JSON");
        }
    }
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("bind gateway listener");

    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::serve(
            listener,
            config,
            Arc::new(EchoService::default()),
            test_agent("asst_test"),
        )
        .await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("protocol").and_then(|v| v.as_u64()), Some(1));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    gateway_handle.abort();
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn chat_session_over_websocket() {
    let mut config = Config::default();
    config.agent.display_name = "Test Assistant".to_string();
    let port = start_gateway(config).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/ws", port))
        .await
        .expect("ws connect");

    // No thread yet: the chat gets the no-active-thread reply instead of a failure.
    send(&mut ws, "early", "chat", json!({ "message": "hello?" })).await;
    let res = next_frame(&mut ws).await;
    assert_eq!(res["id"], "early");
    assert_eq!(res["ok"], true);
    assert_eq!(res["payload"]["kind"], "noActiveThread");
    assert_eq!(
        res["payload"]["reply"],
        "❌ **Error:** No active thread found. Please refresh the page."
    );

    send(&mut ws, "c1", "connect", json!({ "client": { "id": "test" } })).await;
    let hello = next_frame(&mut ws).await;
    assert_eq!(hello["ok"], true);
    assert_eq!(hello["payload"]["type"], "hello-ok");
    assert_eq!(hello["payload"]["session"]["threadId"], "thread_test");
    let session_id = hello["payload"]["session"]["sessionId"]
        .as_str()
        .expect("session id")
        .to_string();

    let welcome = next_frame(&mut ws).await;
    assert_eq!(welcome["event"], "chat.message");
    let content = welcome["payload"]["content"].as_str().unwrap();
    assert!(content.contains("Test Assistant Ready!"));
    assert!(content.contains("`thread_test`"));

    send(&mut ws, "m1", "chat", json!({ "message": "ping" })).await;
    let step1 = next_frame(&mut ws).await;
    assert_eq!(step1["event"], "chat.step");
    assert_eq!(step1["payload"]["sessionId"], session_id.as_str());
    assert_eq!(step1["payload"]["output"], "User message created: ping...");
    let step2 = next_frame(&mut ws).await;
    assert_eq!(step2["payload"]["output"], "Run status: completed");

    let reply = next_frame(&mut ws).await;
    assert_eq!(reply["id"], "m1");
    assert_eq!(reply["payload"]["kind"], "assistant");
    assert_eq!(reply["payload"]["reply"], "echo: ping");
    assert_eq!(reply["payload"]["author"], "Test Assistant");

    // The second turn only shows its own reply.
    send(&mut ws, "m2", "chat", json!({ "message": "pong" })).await;
    let _ = next_frame(&mut ws).await;
    let _ = next_frame(&mut ws).await;
    let reply = next_frame(&mut ws).await;
    assert_eq!(reply["payload"]["reply"], "echo: pong");

    send(&mut ws, "s1", "status", json!({})).await;
    let status = next_frame(&mut ws).await;
    assert_eq!(status["payload"]["agentId"], "asst_test");
    assert_eq!(status["payload"]["activeSessions"], 1);
    assert_eq!(status["payload"]["sessionId"], session_id.as_str());
    assert!(status["payload"]["sessionStartedAt"].is_string());
    assert!(status["payload"]["sessionAgeSecs"].as_i64().unwrap() >= 0);

    send(&mut ws, "x1", "nope", json!({})).await;
    let unknown = next_frame(&mut ws).await;
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"], "unknown method: nope");
}

#[tokio::test]
async fn connect_requires_configured_token() {
    let mut config = Config::default();
    config.gateway.auth.mode = relay::config::GatewayAuthMode::Token;
    config.gateway.auth.token = Some("secret".to_string());
    if std::env::var("RELAY_GATEWAY_TOKEN").is_ok() {
        return;
    }
    let port = start_gateway(config).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/ws", port))
        .await
        .expect("ws connect");

    send(&mut ws, "c1", "connect", json!({ "auth": { "token": "wrong" } })).await;
    let res = next_frame(&mut ws).await;
    assert_eq!(res["ok"], false);
    assert_eq!(res["error"], "unauthorized: gateway token mismatch");

    send(&mut ws, "c2", "connect", json!({ "auth": { "token": "secret" } })).await;
    let res = next_frame(&mut ws).await;
    assert_eq!(res["ok"], true);
    assert_eq!(res["payload"]["session"]["threadId"], "thread_test");
}

/// Accepts messages but the run never finishes.
struct StalledRunService;

#[async_trait]
impl AgentService for StalledRunService {
    async fn get_agent(&self, agent_id: &str) -> Result<Agent, AgentServiceError> {
        Ok(test_agent(agent_id))
    }

    async fn create_thread(&self) -> Result<Thread, AgentServiceError> {
        Ok(serde_json::from_value(json!({ "id": "thread_stalled" })).unwrap())
    }

    async fn create_message(
        &self,
        _thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, AgentServiceError> {
        Ok(serde_json::from_value(json!({ "role": "user", "content": content })).unwrap())
    }

    async fn create_and_process_run(
        &self,
        _thread_id: &str,
        _agent_id: &str,
    ) -> Result<Run, AgentServiceError> {
        std::future::pending().await
    }

    async fn list_messages(
        &self,
        _thread_id: &str,
        _order: ListOrder,
    ) -> Result<Vec<ThreadMessage>, AgentServiceError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn shutdown_reaches_client_during_a_running_turn() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway listener");
    let port = listener.local_addr().expect("local_addr").port();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        gateway::serve_with_shutdown(
            listener,
            Config::default(),
            Arc::new(StalledRunService),
            test_agent("asst_test"),
            async move {
                let _ = stop_rx.await;
            },
        )
        .await
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/ws", port))
        .await
        .expect("ws connect");
    send(&mut ws, "c1", "connect", json!({})).await;
    assert_eq!(next_frame(&mut ws).await["ok"], true);
    assert_eq!(next_frame(&mut ws).await["event"], "chat.message");

    send(&mut ws, "m1", "chat", json!({ "message": "hang on" })).await;
    let step = next_frame(&mut ws).await;
    assert_eq!(step["event"], "chat.step");

    // the run is still in flight when the gateway stops
    stop_tx.send(()).expect("server waiting for stop");
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["event"], "shutdown");

    let stopped = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("gateway stops within 5s")
        .expect("server task");
    assert!(stopped.is_ok());
}
