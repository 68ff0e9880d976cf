use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "agent-bridge")]
#[command(about = "Agent Bridge CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.agent-bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (health on GET /, chat endpoint on the configured path).
    Serve {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.agent-bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8787)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one message through a running gateway and print the reply.
    Ask {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.agent-bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Existing thread id to continue.
        #[arg(long, value_name = "ID")]
        thread: Option<String>,

        /// Status checks to make while the reply is pending.
        #[arg(long, default_value_t = 10)]
        checks: u32,

        /// Pause between status checks, in milliseconds.
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,

        /// Message text.
        message: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("agent-bridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            config,
            thread,
            checks,
            wait_ms,
            message,
        }) => {
            let options = AskOptions {
                thread,
                checks,
                wait: Duration::from_millis(wait_ms),
            };
            match run_ask(config, message, options).await {
                Ok(answer) => {
                    if let Some(reply) = answer.reply {
                        println!("{}", reply.trim());
                    } else {
                        println!(
                            "(still pending; conversation {})",
                            answer.conversation_id.as_deref().unwrap_or("unknown")
                        );
                    }
                }
                Err(e) => {
                    eprintln!("ask failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(bridge::config::default_config_path);
    let dir = bridge::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<std::path::PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = bridge::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    bridge::gateway::run_gateway(config).await
}

struct AskOptions {
    thread: Option<String>,
    checks: u32,
    wait: Duration,
}

#[derive(Debug)]
struct Answer {
    reply: Option<String>,
    conversation_id: Option<String>,
}

impl Answer {
    fn from_body(body: &Value) -> Self {
        Self {
            reply: body.get("reply").and_then(|v| v.as_str()).map(str::to_string),
            conversation_id: body
                .get("conversation_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

async fn post_chat(client: &reqwest::Client, url: &str, body: &Value) -> anyhow::Result<Answer> {
    let res = client.post(url).json(body).send().await?;
    let status = res.status();
    let payload: Value = res.json().await.unwrap_or_else(|_| json!({}));
    if !status.is_success() {
        let err = payload
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed");
        anyhow::bail!("gateway answered {}: {} {}", status.as_u16(), err, payload);
    }
    Ok(Answer::from_body(&payload))
}

async fn run_ask(
    config_path: Option<std::path::PathBuf>,
    message: String,
    options: AskOptions,
) -> anyhow::Result<Answer> {
    let (config, _) = bridge::config::load_config(config_path)?;
    let url = format!(
        "http://{}:{}{}",
        config.gateway.bind.trim(),
        config.gateway.port,
        config.gateway.path
    );
    let client = reqwest::Client::new();

    let mut body = json!({ "message": message });
    if let Some(thread) = &options.thread {
        body["thread_id"] = Value::String(thread.clone());
    }
    let mut answer = post_chat(&client, &url, &body).await?;

    let mut checks = 0;
    while answer.reply.is_none() && checks < options.checks {
        let Some(conversation_id) = answer.conversation_id.clone() else {
            break;
        };
        tokio::time::sleep(options.wait).await;
        checks += 1;
        log::debug!("status check {} for {}", checks, conversation_id);
        answer = post_chat(
            &client,
            &url,
            &json!({ "status_only": true, "conversation_id": conversation_id }),
        )
        .await?;
        if answer.conversation_id.is_none() {
            answer.conversation_id = Some(conversation_id);
        }
    }
    Ok(answer)
}
