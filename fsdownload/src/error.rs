//! Error types for the download pipeline

use fssoundcloud::SoundCloudError;
use thiserror::Error;

/// Result type alias for download operations
pub type Result<T> = std::result::Result<T, DownloadError>;

/// Errors that can occur while producing audio or archives
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(
        "Failed to resolve URL: 401 Unauthorized - Invalid client_id. Tried {attempts} times. {excerpt}"
    )]
    AuthExpired { attempts: usize, excerpt: String },

    #[error(
        "No valid client_id found. Tested {tried} candidates. \
         You can set the SOUNDCLOUD_CLIENT_ID environment variable with a valid client_id."
    )]
    NoValidToken { tried: usize },

    #[error("Track is DRM-protected (encrypted) and cannot be downloaded")]
    DrmProtected,

    #[error("Failed to get stream URL: {0}")]
    NoPlayableStream(String),

    /// Encoder failure, carrying a one-line summary
    #[error("FFmpeg conversion failed: {0}")]
    TranscodeError(String),

    #[error("Failed to resolve URL: {}", describe_resolve(.status, .message))]
    ResolveError { status: Option<u16>, message: String },

    #[error("No tracks were successfully downloaded")]
    NoItemsSucceeded,

    #[error("Track download timed out after {0}s")]
    Timeout(u64),

    #[error("Only MP3 format is supported (got {0})")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Tagging error: {0}")]
    Tagging(String),

    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

fn describe_resolve(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("{} - {}", code, message),
        None => message.to_string(),
    }
}

impl DownloadError {
    pub fn is_drm(&self) -> bool {
        matches!(self, Self::DrmProtected)
    }

    /// Whether a collection may drop the item and carry on
    pub fn is_skippable(&self) -> bool {
        !matches!(
            self,
            Self::NoItemsSucceeded | Self::UnsupportedFormat(_) | Self::Config(_)
        )
    }

    /// Message shown to API clients
    ///
    /// Encoder errors keep their first line only.
    pub fn client_message(&self) -> String {
        match self {
            Self::TranscodeError(summary) => {
                let first = summary.lines().next().unwrap_or_default();
                format!("FFmpeg conversion failed: {}", first)
            }
            other => other.to_string(),
        }
    }
}

impl From<SoundCloudError> for DownloadError {
    fn from(err: SoundCloudError) -> Self {
        match err {
            SoundCloudError::AuthExpired { attempts, excerpt } => {
                Self::AuthExpired { attempts, excerpt }
            }
            SoundCloudError::NoValidToken { tried } => Self::NoValidToken { tried },
            SoundCloudError::DrmProtected => Self::DrmProtected,
            SoundCloudError::NoPlayableStream(reason) => Self::NoPlayableStream(reason),
            SoundCloudError::ResolveError { status, message } => {
                Self::ResolveError { status, message }
            }
            SoundCloudError::Http(e) => Self::Http(e),
            SoundCloudError::Json(e) => Self::ResolveError {
                status: None,
                message: e.to_string(),
            },
            SoundCloudError::InvalidUrl(e) => Self::ResolveError {
                status: None,
                message: format!("Invalid URL: {}", e),
            },
            SoundCloudError::Config(e) => Self::Config(e),
        }
    }
}

impl From<zip::result::ZipError> for DownloadError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<id3::Error> for DownloadError {
    fn from(err: id3::Error) -> Self {
        Self::Tagging(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DownloadError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soundcloud_errors_map_by_variant() {
        let err: DownloadError = SoundCloudError::DrmProtected.into();
        assert!(err.is_drm());

        let err: DownloadError = SoundCloudError::NoValidToken { tried: 4 }.into();
        assert!(matches!(err, DownloadError::NoValidToken { tried: 4 }));
        assert!(err.to_string().contains("SOUNDCLOUD_CLIENT_ID"));

        let err: DownloadError = SoundCloudError::resolve_status(404, "gone").into();
        assert!(matches!(
            err,
            DownloadError::ResolveError {
                status: Some(404),
                ..
            }
        ));
    }

    #[test]
    fn test_skippable() {
        assert!(DownloadError::DrmProtected.is_skippable());
        assert!(DownloadError::Timeout(600).is_skippable());
        assert!(DownloadError::TranscodeError("exit 1".into()).is_skippable());
        assert!(!DownloadError::NoItemsSucceeded.is_skippable());
        assert!(!DownloadError::UnsupportedFormat("flac".into()).is_skippable());
    }

    #[test]
    fn test_client_message_keeps_first_line() {
        let err = DownloadError::TranscodeError("line one\nline two".into());
        assert_eq!(err.client_message(), "FFmpeg conversion failed: line one");
    }
}
