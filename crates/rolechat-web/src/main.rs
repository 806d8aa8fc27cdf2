//! Role-gated Gemini chat server.
//!
//! # Usage
//!
//! ```bash
//! GEMINI_API_KEY=AIza... cargo run -p rolechat-web
//! cargo run -p rolechat-web -- --port 8080 --static-dir ./frontend/out
//! RUST_LOG=rolechat=debug cargo run -p rolechat-web
//! ```
//!
//! A `.env` file in the working directory is read before the arguments are
//! parsed. Without a server-side key, every chat request must carry its own
//! `api_key`.
//!
//! ## Sending messages
//!
//! ```bash
//! curl -X POST localhost:3001/api/sessions -H 'content-type: application/json' \
//!      -d '{"page":"roles"}'
//! curl -X POST localhost:3001/api/sessions/<id>/chat -H 'content-type: application/json' \
//!      -d '{"message":"why does my python loop never end?","role":"code-generator"}'
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rolechat::gemini::{GEMINI_BASE_URL, GeminiConfig, GeminiService};
use rolechat_web::{DEFAULT_SESSION_TTL, WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Role-gated Gemini chat server.
#[derive(Parser)]
#[command(about = "Serve the role-gated Gemini chat pages over HTTP")]
struct Args {
    /// Port for the HTTP server.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Gemini API key used when a request does not carry one.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Directory of a prebuilt frontend to serve.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Timeout for each model request, in seconds.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Gemini API root.
    #[arg(long, default_value = GEMINI_BASE_URL)]
    base_url: String,

    /// Drop sessions idle for this many seconds (0 keeps them until deleted).
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL.as_secs())]
    session_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 1. Model service.
    let service = GeminiService::new(&GeminiConfig {
        base_url: args.base_url,
        timeout: Duration::from_secs(args.timeout_secs),
    })?;

    // 2. HTTP server.
    let config = WebConfig {
        bind_addr: SocketAddr::new(args.bind, args.port),
        static_dir: args.static_dir,
        default_api_key: args.api_key,
        session_ttl: Some(Duration::from_secs(args.session_ttl_secs)).filter(|t| !t.is_zero()),
    };
    if config.default_api_key.is_none() {
        info!("No server-side API key; chat requests must include api_key");
    }
    let addr = spawn_web(Arc::new(service), config).await?;
    info!("Listening on http://{addr}");
    println!("Web UI: http://{addr}");

    // 3. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for ctrl-c: {e}"))?;
    info!("Shutting down");
    Ok(())
}
