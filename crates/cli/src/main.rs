use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use relay::agents::{AgentService, AgentServiceClient};
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "relay CLI: chat gateway for a hosted agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (HTTP + WebSocket chat front-end). Resolves the configured agent before listening.
    Gateway {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// WebSocket and HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with the agent via the gateway (interactive; one thread for the whole chat).
    Chat {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Show the configured agent as the service reports it.
    Agent {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Agent { config }) => {
            if let Err(e) = run_agent(config).await {
                log::error!("agent lookup failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    relay::gateway::run_gateway(config).await
}

async fn run_agent(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _) = relay::config::load_config(config_path)?;
    let agent_id = relay::config::resolve_agent_id(&config)
        .ok_or_else(|| anyhow::anyhow!("agent id missing (set agent.agentId or RELAY_AGENT_ID)"))?;
    let client = AgentServiceClient::from_config(&config)?;
    let agent = client.get_agent(&agent_id).await?;
    println!("id:       {}", agent.id);
    println!("name:     {}", agent.name.as_deref().unwrap_or("-"));
    println!("model:    {}", agent.model.as_deref().unwrap_or("-"));
    println!("endpoint: {}", client.endpoint());
    if let Some(instructions) = agent.instructions.as_deref().filter(|s| !s.trim().is_empty()) {
        println!("instructions:\n{}", instructions.trim());
    }
    Ok(())
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Read frames until the response with `id` arrives; events are printed as they come.
async fn wait_response(ws: &mut WsStream, id: &str) -> Result<serde_json::Value, String> {
    while let Some(msg) = ws.next().await {
        let msg = msg.map_err(|e| e.to_string())?;
        let Message::Text(text) = msg else { continue };
        let frame: serde_json::Value = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        match frame.get("type").and_then(|v| v.as_str()) {
            Some("event") => {
                if print_event(&frame) {
                    return Err("gateway shut down".to_string());
                }
            }
            Some("res") if frame.get("id").and_then(|v| v.as_str()) == Some(id) => {
                if !frame.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
                    let err = frame
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("request failed");
                    return Err(err.to_string());
                }
                return Ok(frame.get("payload").cloned().unwrap_or_default());
            }
            _ => {}
        }
    }
    Err("connection closed".to_string())
}

/// Print an event frame; returns true when it is the shutdown event.
fn print_event(frame: &serde_json::Value) -> bool {
    let payload = frame.get("payload");
    let field = |name: &str| {
        payload
            .and_then(|p| p.get(name))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    match frame.get("event").and_then(|v| v.as_str()) {
        Some("chat.message") => println!("< {}", field("content").trim()),
        Some("chat.step") => println!("  [{}] {}", field("name"), field("output")),
        Some("shutdown") => return true,
        _ => {}
    }
    false
}

async fn send_request(
    ws: &mut WsStream,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value, String> {
    let req = serde_json::json!({
        "type": "req",
        "id": id,
        "method": method,
        "params": params
    });
    ws.send(Message::Text(req.to_string()))
        .await
        .map_err(|e| e.to_string())?;
    wait_response(ws, id).await
}

async fn run_chat(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, _) = relay::config::load_config(config_path)?;
    let bind = config.gateway.bind.trim();
    let ws_url = format!("ws://{}:{}/ws", bind, config.gateway.port);
    let token = relay::config::resolve_gateway_token(&config);

    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url).await?;
    let mut connect_params = serde_json::json!({
        "client": { "id": "relay-cli", "version": env!("CARGO_PKG_VERSION") },
    });
    if let Some(ref t) = token {
        connect_params["auth"] = serde_json::json!({ "token": t });
    }
    let hello = send_request(&mut ws, "connect", "connect", connect_params)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let thread_id = hello
        .pointer("/session/threadId")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    log::info!("connected to {} (thread {})", ws_url, thread_id);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut request_no: u64 = 0;

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        request_no += 1;
        let id = format!("chat-{}", request_no);
        match send_request(&mut ws, &id, "chat", serde_json::json!({ "message": input })).await {
            Ok(payload) => {
                let reply = payload.get("reply").and_then(|v| v.as_str()).unwrap_or("");
                match payload.get("author").and_then(|v| v.as_str()) {
                    Some(author) => println!("< {}: {}", author, reply.trim()),
                    None => println!("< {}", reply.trim()),
                }
            }
            Err(e) => {
                eprintln!("chat error: {}", e);
                if e == "gateway shut down" || e == "connection closed" {
                    break;
                }
            }
        }
    }

    let _ = ws.close(None).await;
    Ok(())
}
