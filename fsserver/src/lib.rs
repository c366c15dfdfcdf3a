//! # fsserver - HTTP server layer for FreeSound
//!
//! A thin wrapper over Axum shared by the FreeSound crates:
//!
//! - [`server`]: the [`Server`] and its builder, CORS and graceful shutdown
//! - [`logs`]: tracing setup with a ring buffer exposed over SSE, plus the
//!   `download.log` and `access.log` files
//! - [`access`]: the access log middleware
//!
//! Feature crates register their routes through extension traits on
//! [`Server`] (see `fsdownload::DownloaderServerExt`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use fsserver::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new_configured().build();
//!     server.init_logging().await;
//!
//!     server.add_route("/", || async {
//!         serde_json::json!({"status": "running"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod logs;
pub mod server;

pub use logs::{ACCESS_TARGET, LogState, SseLayer, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerInfo, cors_layer};
