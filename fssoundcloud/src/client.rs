//! HTTP client for the SoundCloud API
//!
//! # Example
//!
//! ```no_run
//! use fssoundcloud::SoundCloudClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SoundCloudClient::new()?;
//!
//!     let item = client.resolve("https://soundcloud.com/artist/song").await?;
//!     println!("{} - {}", item.artist, item.title);
//!
//!     if let Some(track) = &item.track {
//!         let stream = client.locate(track).await?;
//!         println!("Stream: {}", stream.url);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use reqwest::Client;

use crate::client_id::{ClientIdCache, FALLBACK_CLIENT_IDS};
use crate::error::Result;

/// Default SoundCloud API base URL
pub const DEFAULT_API_BASE: &str = "https://api-v2.soundcloud.com";

/// Default SoundCloud site URL
pub const DEFAULT_SITE_BASE: &str = "https://soundcloud.com";

/// Default timeout for HTTP requests (120 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Browser User-Agent, the API rejects unknown clients
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// SoundCloud HTTP client
///
/// Cloning is cheap: the connection pool and the client id cache are shared.
#[derive(Debug, Clone)]
pub struct SoundCloudClient {
    pub(crate) client: Client,
    pub(crate) api_base: String,
    pub(crate) site_base: String,
    pub(crate) client_ids: Arc<ClientIdCache>,
}

impl SoundCloudClient {
    /// Create a new client with default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn site_base(&self) -> &str {
        &self.site_base
    }

    /// Get the internal HTTP client
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Get the shared client id cache
    pub fn client_ids(&self) -> &ClientIdCache {
        &self.client_ids
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

/// Builder for [`SoundCloudClient`]
pub struct ClientBuilder {
    client: Option<Client>,
    api_base: String,
    site_base: String,
    timeout: Duration,
    user_agent: String,
    client_id: Option<String>,
    fallback_ids: Vec<String>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            api_base: DEFAULT_API_BASE.to_string(),
            site_base: DEFAULT_SITE_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            client_id: None,
            fallback_ids: FALLBACK_CLIENT_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn site_base(mut self, url: impl Into<String>) -> Self {
        self.site_base = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Client id tried before scraping
    pub fn client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// Replace the static fallback client ids
    pub fn fallback_ids(mut self, ids: Vec<String>) -> Self {
        self.fallback_ids = ids;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<SoundCloudClient> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .default_headers(browser_headers(&self.site_base))
                .timeout(self.timeout)
                .build()?,
        };

        let client_ids = ClientIdCache::new(
            client.clone(),
            self.api_base.clone(),
            self.site_base.clone(),
            self.client_id,
            self.fallback_ids,
        );

        Ok(SoundCloudClient {
            client,
            api_base: self.api_base,
            site_base: self.site_base,
            client_ids: Arc::new(client_ids),
        })
    }
}

fn browser_headers(site_base: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    if let Ok(origin) = HeaderValue::from_str(site_base) {
        headers.insert(ORIGIN, origin);
    }
    if let Ok(referer) = HeaderValue::from_str(&format!("{}/", site_base)) {
        headers.insert(REFERER, referer);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = SoundCloudClient::builder().build().unwrap();
        assert_eq!(client.api_base(), DEFAULT_API_BASE);
        assert_eq!(client.site_base(), DEFAULT_SITE_BASE);
        assert_eq!(
            client.api_url("/resolve"),
            "https://api-v2.soundcloud.com/resolve"
        );
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = SoundCloudClient::builder()
            .api_base("http://127.0.0.1:9000/")
            .site_base("http://127.0.0.1:9001/")
            .build()
            .unwrap();
        assert_eq!(client.api_url("/tracks"), "http://127.0.0.1:9000/tracks");
        assert_eq!(client.site_base(), "http://127.0.0.1:9001");
    }

    #[test]
    fn test_browser_headers() {
        let headers = browser_headers(DEFAULT_SITE_BASE);
        assert_eq!(headers[ORIGIN], "https://soundcloud.com");
        assert_eq!(headers[REFERER], "https://soundcloud.com/");
        assert_eq!(headers[ACCEPT_LANGUAGE], "en-US,en;q=0.9");
    }
}
