//! HTTP API for the role-gated chat pages.
//!
//! `rolechat-web` provides an axum server that owns the per-user
//! [`Session`](rolechat::session::Session)s and exposes the three pages
//! (`roles`, `space`, `widgets`) as a REST API. Rendering is left to a
//! browser frontend, which can be served from `static_dir`.
//!
//! # Quick start
//!
//! ```ignore
//! use rolechat::gemini::{GeminiConfig, GeminiService};
//! use rolechat_web::{WebConfig, spawn_web};
//! use std::sync::Arc;
//!
//! let service = Arc::new(GeminiService::new(&GeminiConfig::default())?);
//! let addr = spawn_web(service, WebConfig::default()).await?;
//! println!("Web UI: http://{addr}");
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/api/pages` | Page titles, menus, parameter ranges |
//! | POST | `/api/sessions` | Start a session for a page |
//! | GET | `/api/sessions/{id}` | Snapshot (`?visit=true` counts a page load) |
//! | DELETE | `/api/sessions/{id}` | End a session |
//! | POST | `/api/sessions/{id}/reset` | Clear transcript and conversation |
//! | POST | `/api/sessions/{id}/chat` | Submit a message to the model |
//! | POST | `/api/sessions/{id}/widgets` | Summarize the widget form |
//! | POST | `/api/sessions/{id}/echo` | Widgets page echo chat |

mod api;
mod server;
pub mod sessions;
pub mod snapshot;

pub use api::AppState;
pub use sessions::SessionRegistry;
pub use snapshot::{PageInfo, SessionSnapshot};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rolechat::model::ModelService;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Directory of a prebuilt frontend to serve for non-API paths.
    ///
    /// If `None`, only API endpoints are served.
    pub static_dir: Option<PathBuf>,
    /// API key used when a chat request does not carry one.
    pub default_api_key: Option<String>,
    /// Drop sessions left idle this long. `None` keeps them until deleted.
    /// Default: 30 minutes.
    pub session_ttl: Option<Duration>,
}

/// Default idle lifetime of a session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            static_dir: None,
            default_api_key: None,
            session_ttl: Some(DEFAULT_SESSION_TTL),
        }
    }
}

impl std::fmt::Debug for WebConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebConfig")
            .field("bind_addr", &self.bind_addr)
            .field("static_dir", &self.static_dir)
            .field(
                "default_api_key",
                &self.default_api_key.as_deref().map(rolechat::config::redact),
            )
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down. With a session TTL,
/// a background task sweeps idle sessions every half TTL.
pub async fn spawn_web(
    service: Arc<dyn ModelService>,
    config: WebConfig,
) -> Result<SocketAddr, String> {
    let sessions = match config.session_ttl.filter(|ttl| !ttl.is_zero()) {
        Some(ttl) => SessionRegistry::with_idle_ttl(ttl),
        None => SessionRegistry::new(),
    };
    let app_state = AppState {
        sessions: Arc::new(sessions),
        service,
        default_api_key: config.default_api_key.filter(|k| !k.trim().is_empty()),
    };
    if let Some(ttl) = app_state.sessions.idle_ttl() {
        spawn_sweeper(app_state.clone(), ttl / 2);
    }
    let router = server::build_router(app_state, config.static_dir);
    server::start_server(router, config.bind_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", config.bind_addr))
}

fn spawn_sweeper(app_state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_millis(10)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            app_state.sweep_idle();
        }
    });
}
