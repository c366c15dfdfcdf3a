//! Extension integrating SoundCloud settings into fsconfig
//!
//! Keys live under `sources.soundcloud`:
//!
//! ```yaml
//! sources:
//!   soundcloud:
//!     client_id: ""        # optional, SOUNDCLOUD_CLIENT_ID wins
//!     api_base: https://api-v2.soundcloud.com
//!     site_base: https://soundcloud.com
//!     timeout_secs: 120
//! ```

use std::env;
use std::time::Duration;

use anyhow::Result;
use fsconfig::Config;
use serde_yaml::Value;

use crate::client::{
    ClientBuilder, SoundCloudClient, DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SITE_BASE,
};

/// Environment variable holding a known-good client id
pub const ENV_CLIENT_ID: &str = "SOUNDCLOUD_CLIENT_ID";

/// Extension trait for SoundCloud settings on `fsconfig::Config`
///
/// # Example
///
/// ```rust,ignore
/// use fsconfig::get_config;
/// use fssoundcloud::SoundCloudConfigExt;
///
/// let config = get_config();
/// let client = config.soundcloud_client()?;
/// ```
pub trait SoundCloudConfigExt {
    /// Client id override, from `SOUNDCLOUD_CLIENT_ID` or the configuration
    fn get_soundcloud_client_id(&self) -> Option<String>;

    /// Stores a client id override in the configuration
    fn set_soundcloud_client_id(&self, client_id: &str) -> Result<()>;

    fn get_soundcloud_api_base(&self) -> String;

    fn get_soundcloud_site_base(&self) -> String;

    /// HTTP timeout for SoundCloud requests
    fn get_soundcloud_timeout(&self) -> Duration;

    /// Builds a [`SoundCloudClient`] from these settings
    fn soundcloud_client(&self) -> crate::Result<SoundCloudClient>;
}

impl SoundCloudConfigExt for Config {
    fn get_soundcloud_client_id(&self) -> Option<String> {
        if let Ok(id) = env::var(ENV_CLIENT_ID) {
            if !id.trim().is_empty() {
                return Some(id.trim().to_string());
            }
        }

        let id = self.get_string_or(&["sources", "soundcloud", "client_id"], "");
        (!id.is_empty()).then_some(id)
    }

    fn set_soundcloud_client_id(&self, client_id: &str) -> Result<()> {
        self.set_value(
            &["sources", "soundcloud", "client_id"],
            Value::String(client_id.to_string()),
        )
    }

    fn get_soundcloud_api_base(&self) -> String {
        self.get_string_or(&["sources", "soundcloud", "api_base"], DEFAULT_API_BASE)
    }

    fn get_soundcloud_site_base(&self) -> String {
        self.get_string_or(&["sources", "soundcloud", "site_base"], DEFAULT_SITE_BASE)
    }

    fn get_soundcloud_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64_or(
            &["sources", "soundcloud", "timeout_secs"],
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ))
    }

    fn soundcloud_client(&self) -> crate::Result<SoundCloudClient> {
        ClientBuilder::new()
            .api_base(self.get_soundcloud_api_base())
            .site_base(self.get_soundcloud_site_base())
            .timeout(self.get_soundcloud_timeout())
            .client_id(self.get_soundcloud_client_id())
            .build()
    }
}
