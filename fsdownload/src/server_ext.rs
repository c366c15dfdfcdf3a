//! Extension registering the downloader on an fsserver server
//!
//! `fsserver` knows nothing about downloads; this trait adds the routes of
//! [`crate::api_rest`] to a [`fsserver::Server`].
//!
//! ```rust,no_run
//! use fsdownload::DownloaderServerExt;
//! use fsserver::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new_configured().build();
//!     server.init_logging().await;
//!     server.init_downloader().await?;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use fsserver::Server;
use tracing::info;

use crate::api_rest::create_router;
use crate::downloader::Downloader;

pub trait DownloaderServerExt {
    /// Builds a [`Downloader`] from the configuration and registers its routes
    async fn init_downloader(&mut self) -> Result<Arc<Downloader>>;

    /// Registers the routes of an existing downloader
    async fn init_downloader_with(&mut self, downloader: Arc<Downloader>) -> Result<Arc<Downloader>>;
}

impl DownloaderServerExt for Server {
    async fn init_downloader(&mut self) -> Result<Arc<Downloader>> {
        let downloader = Arc::new(Downloader::from_config()?);
        self.init_downloader_with(downloader).await
    }

    async fn init_downloader_with(&mut self, downloader: Arc<Downloader>) -> Result<Arc<Downloader>> {
        self.add_router("/", create_router(downloader.clone())).await;
        info!("Downloader routes registered");
        Ok(downloader)
    }
}
