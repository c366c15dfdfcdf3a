//! # Server module - high level API over Axum
//!
//! Hides the router plumbing behind a small set of registration methods.
//! Feature crates add their routes through extension traits implemented on
//! [`Server`], then the binary calls [`Server::start`].
//!
//! ## Features
//!
//! - JSON routes from async closures with `add_route()`
//! - Stateful GET handlers with `add_handler_with_state()`
//! - Sub-routers with `add_router()`
//! - Access log and CORS layers applied at start
//! - Graceful shutdown on Ctrl+C

use crate::access::access_log;
use crate::logs::{LogState, create_logs_router, init_logging, log_dump, log_sse};
use anyhow::{Context, Result};
use axum::handler::Handler;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use fsconfig::get_config;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tracing::{error, info, warn};

/// Serializable server information
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

/// Main server
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    cors_origins: Vec<String>,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    log_state: Option<LogState>,
}

impl Server {
    /// Creates a server answering on every interface at `http_port`
    ///
    /// ```rust
    /// # use fsserver::Server;
    /// let server = Server::new("FreeSound", "localhost", 8000);
    /// assert_eq!(server.info().http_port, 8000);
    /// ```
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            cors_origins: vec!["*".to_string()],
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            log_state: None,
        }
    }

    pub fn new_configured() -> Self {
        ServerBuilder::new_configured().build()
    }

    /// Adds a JSON GET route backed by an async closure
    ///
    /// ```rust,no_run
    /// # use fsserver::Server;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", "localhost", 8000);
    /// server.add_route("/", || async {
    ///     serde_json::json!({"status": "running"})
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = {
            let f = f.clone();
            move || {
                let f = f.clone();
                async move { Json(f().await) }
            }
        };

        self.mount(path, Router::new().route("/", get(handler))).await;
    }

    /// Adds a GET handler with state
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route("/", get(handler)).with_state(state);
        self.mount(path, route).await;
    }

    /// Adds a sub-router
    ///
    /// - `"/"` merges it into the main router
    /// - any other path nests it under that path
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        let mut r = self.router.write().await;

        let combined = if path == "/" {
            std::mem::take(&mut *r).merge(sub_router)
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            std::mem::take(&mut *r).nest(&normalized, sub_router)
        };

        *r = combined;
    }

    async fn mount(&mut self, path: &str, route: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(route)
        } else {
            // nest("/x", route "/") only matches "/x"
            std::mem::take(&mut *r).nest(path, route)
        };
    }

    /// Replaces the allowed CORS origins (`"*"` allows any origin)
    pub fn set_cors_origins(&mut self, origins: Vec<String>) {
        self.cors_origins = origins;
    }

    /// Returns the registered routes wrapped in the access log and CORS layers
    pub async fn app(&self) -> Router {
        let router = self.router.read().await.clone();
        router
            .layer(middleware::from_fn(access_log))
            .layer(cors_layer(&self.cors_origins))
    }

    /// Binds the listener and serves in the background
    ///
    /// Fails when the port cannot be bound. Ctrl+C triggers a graceful
    /// shutdown; use [`Server::wait`] to block until then.
    pub async fn start(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!(
            "Server {} running at http://{}:{}",
            self.name, self.base_url, self.http_port
        );

        let app = self.app().await;
        self.join_handle = Some(tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await;

            if let Err(e) = served {
                error!("Server error: {}", e);
            }
        }));

        Ok(())
    }

    /// Waits for the server to stop
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Server information
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.http_port,
        }
    }

    /// Log state, once [`Server::init_logging`] ran
    pub fn log_state(&self) -> Option<&LogState> {
        self.log_state.as_ref()
    }

    /// Initializes logging and registers the log routes
    ///
    /// Registers `/log-sse`, `/log-dump` and `/api/log_setup`.
    pub async fn init_logging(&mut self) {
        let log_state = init_logging();

        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_router("/api", create_logs_router(log_state.clone()))
            .await;

        self.log_state = Some(log_state);
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down"),
        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
    }
}

/// Builds the CORS layer for the configured origins
///
/// A `"*"` entry allows any origin without credentials. An explicit list
/// allows credentials and mirrors the requested methods and headers.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    base_url: String,
    http_port: u16,
    cors_origins: Vec<String>,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            cors_origins: vec!["*".to_string()],
        }
    }

    /// Builder filled from the global configuration
    pub fn new_configured() -> Self {
        let config = get_config();
        Self {
            name: "FreeSound".to_string(),
            base_url: config.get_base_url(),
            http_port: config.get_http_port(),
            cors_origins: config.get_cors_origins(),
        }
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Consumes the builder
    pub fn build(self) -> Server {
        let mut server = Server::new(self.name, self.base_url, self.http_port);
        server.set_cors_origins(self.cors_origins);
        server
    }
}
