//! Error types for the SoundCloud client

use thiserror::Error;

/// Result type alias for SoundCloud operations
pub type Result<T> = std::result::Result<T, SoundCloudError>;

/// Longest upstream body excerpt kept in an error message
pub const EXCERPT_LEN: usize = 200;

/// Errors that can occur when talking to SoundCloud
#[derive(Error, Debug)]
pub enum SoundCloudError {
    /// The resolve endpoint kept answering 401 after refreshing the client id
    #[error(
        "Failed to resolve URL: 401 Unauthorized - Invalid client_id. Tried {attempts} times. {excerpt}"
    )]
    AuthExpired { attempts: usize, excerpt: String },

    /// No client id candidate passed the probe
    #[error(
        "No valid client_id found. Tested {tried} candidates. \
         You can set the SOUNDCLOUD_CLIENT_ID environment variable with a valid client_id."
    )]
    NoValidToken { tried: usize },

    /// Every stream candidate was encrypted
    #[error("Track is DRM-protected (encrypted) and cannot be downloaded")]
    DrmProtected,

    /// No usable stream for the track
    #[error("Failed to get stream URL: {0}")]
    NoPlayableStream(String),

    /// Resolution failed (HTTP status, transport or payload)
    #[error("Failed to resolve URL: {}", describe_resolve(.status, .message))]
    ResolveError { status: Option<u16>, message: String },

    /// HTTP client error outside of resolution
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error (from fsconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

fn describe_resolve(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("{} - {}", code, message),
        None => message.to_string(),
    }
}

impl SoundCloudError {
    /// Resolution error carrying an HTTP status and a body excerpt
    pub fn resolve_status(status: u16, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            "No error details".to_string()
        } else {
            excerpt(body)
        };
        Self::ResolveError {
            status: Some(status),
            message,
        }
    }

    /// Resolution error without an HTTP status
    pub fn resolve(message: impl Into<String>) -> Self {
        Self::ResolveError {
            status: None,
            message: message.into(),
        }
    }

    pub fn no_stream(message: impl Into<String>) -> Self {
        Self::NoPlayableStream(message.into())
    }

    pub fn is_drm(&self) -> bool {
        matches!(self, Self::DrmProtected)
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::AuthExpired { .. } | Self::NoValidToken { .. })
    }
}

/// First [`EXCERPT_LEN`] characters of an upstream body
pub fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_LEN).collect()
}
