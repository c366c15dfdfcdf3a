//! Stream location
//!
//! Picks a transcoding of a track and exchanges it for a playable HLS URL,
//! skipping encrypted variants.

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::client::SoundCloudClient;
use crate::drm::is_drm_protected_url;
use crate::error::{Result, SoundCloudError};
use crate::models::{StreamTarget, Track, Transcoding};

impl SoundCloudClient {
    /// Finds a playable, unencrypted stream for a track
    ///
    /// Transcodings whose URL or protocol declares encryption are only tried
    /// when no other one exists. When all of them fail the
    /// `/media/.../stream/hls` endpoint is tried with the transcoding secret.
    pub async fn locate(&self, track: &Track) -> Result<StreamTarget> {
        let transcodings = track.transcodings();
        if transcodings.is_empty() {
            return Err(SoundCloudError::no_stream(
                "No transcodings available for this track",
            ));
        }

        let (clear, protected): (Vec<&Transcoding>, Vec<&Transcoding>) = transcodings
            .iter()
            .filter(|t| t.is_streamable())
            .partition(|t| !t.is_protected());

        let candidates = if clear.is_empty() { protected } else { clear };
        if candidates.is_empty() {
            return Err(SoundCloudError::no_stream(
                "No HLS transcodings available for this track",
            ));
        }

        let client_id = self.client_ids.get(false).await?;
        let authorization = track.track_authorization.as_deref();
        let mut drm_seen = false;

        for transcoding in candidates {
            if transcoding.url().is_empty() {
                continue;
            }

            let stream_url = match authorized_url(transcoding.url(), &client_id, authorization) {
                Ok(url) => url,
                Err(e) => {
                    debug!("Skipping transcoding with bad URL: {}", e);
                    continue;
                }
            };

            match self.fetch_stream_url(stream_url).await {
                Some(url) if is_drm_protected_url(&url) => {
                    debug!("Transcoding {} is DRM-protected", transcoding.protocol());
                    drm_seen = true;
                }
                Some(url) => {
                    return Ok(StreamTarget {
                        url,
                        is_protected: false,
                    })
                }
                None => continue,
            }
        }

        if let Some(url) = self
            .alternative_stream_url(track, transcodings, &client_id)
            .await
        {
            if !is_drm_protected_url(&url) {
                return Ok(StreamTarget {
                    url,
                    is_protected: false,
                });
            }
            drm_seen = true;
        }

        if drm_seen {
            warn!("Track {} only has DRM-protected streams", track.id);
            Err(SoundCloudError::DrmProtected)
        } else {
            Err(SoundCloudError::no_stream(
                "All transcodings failed or are DRM-protected",
            ))
        }
    }

    /// GETs a transcoding endpoint and reads the `url` field of the answer
    async fn fetch_stream_url(&self, endpoint: Url) -> Option<String> {
        let response = match self.client.get(endpoint).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Stream URL request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("Stream URL request answered {}", response.status());
            return None;
        }

        let body: Value = response.json().await.ok()?;
        body.get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    }

    async fn alternative_stream_url(
        &self,
        track: &Track,
        transcodings: &[Transcoding],
        client_id: &str,
    ) -> Option<String> {
        if track.id == 0 {
            return None;
        }

        let secret = transcodings
            .iter()
            .map(Transcoding::url)
            .find(|url| !url.is_empty())
            .and_then(transcoding_secret)?;

        let endpoint = self.api_url(&format!(
            "/media/soundcloud:tracks:{}/{}/stream/hls",
            track.id, secret
        ));
        let endpoint = authorized_url(&endpoint, client_id, track.track_authorization.as_deref())
            .ok()?;

        self.fetch_stream_url(endpoint).await
    }
}

/// Appends `client_id` and, when known, `track_authorization`
fn authorized_url(base: &str, client_id: &str, authorization: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(base)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", client_id);
        if let Some(authorization) = authorization.filter(|a| !a.is_empty()) {
            query.append_pair("track_authorization", authorization);
        }
    }
    Ok(url)
}

/// Second-to-last path segment of a transcoding URL
fn transcoding_secret(url: &str) -> Option<String> {
    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() < 2 {
        return None;
    }
    let secret = parts[parts.len() - 2];
    (!secret.is_empty()).then(|| secret.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorized_url() {
        let url = authorized_url(
            "https://api-v2.soundcloud.com/media/soundcloud:tracks:1/abc/stream/hls",
            "CID",
            Some("AUTH"),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api-v2.soundcloud.com/media/soundcloud:tracks:1/abc/stream/hls?client_id=CID&track_authorization=AUTH"
        );

        let url = authorized_url("https://x/stream?a=1", "CID", None).unwrap();
        assert_eq!(url.as_str(), "https://x/stream?a=1&client_id=CID");
    }

    #[test]
    fn test_transcoding_secret() {
        assert_eq!(
            transcoding_secret(
                "https://api-v2.soundcloud.com/media/soundcloud:tracks:1/0a1b2c/stream/hls"
            )
            .as_deref(),
            Some("stream")
        );
        assert_eq!(transcoding_secret("https://a/secret/").as_deref(), Some("secret"));
        assert_eq!(transcoding_secret("nothing"), None);
    }
}
