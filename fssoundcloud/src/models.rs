//! Data models for SoundCloud API responses
//!
//! Upstream payloads are loosely typed: most fields may be missing or null,
//! so everything except the id is optional. [`ResolvedItem`] is the
//! normalized view used by the rest of FreeSound.

use serde::{Deserialize, Serialize};

use crate::drm::{is_drm_protected_protocol, is_drm_protected_url};

/// Placeholder for missing titles and artists
pub const UNKNOWN: &str = "Unknown";

// ============================================================================
// Upstream payloads
// ============================================================================

/// Track or playlist owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub permalink_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscodingFormat {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// One stream variant of a track
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcoding {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub format: Option<TranscodingFormat>,
    #[serde(default)]
    pub snipped: Option<bool>,
}

impl Transcoding {
    /// Lower-cased protocol, empty when unknown
    pub fn protocol(&self) -> String {
        self.format
            .as_ref()
            .and_then(|f| f.protocol.as_deref())
            .unwrap_or_default()
            .to_lowercase()
    }

    /// HLS or progressive stream variants are the only ones we can transcode
    pub fn is_streamable(&self) -> bool {
        let protocol = self.protocol();
        protocol.contains("hls") || protocol.contains("stream")
    }

    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }

    /// Encrypted, judging by its URL or its declared protocol
    pub fn is_protected(&self) -> bool {
        is_drm_protected_url(self.url()) || is_drm_protected_protocol(&self.protocol())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub transcodings: Vec<Transcoding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherMetadata {
    #[serde(default)]
    pub album_title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

/// Track payload, full or partial
///
/// Playlist payloads often embed partial tracks with only an id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    /// Milliseconds
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub tag_list: Option<String>,
    #[serde(default)]
    pub release_title: Option<String>,
    #[serde(default)]
    pub publisher_metadata: Option<PublisherMetadata>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permalink_url: Option<String>,
    #[serde(default)]
    pub playback_count: Option<u64>,
    #[serde(default)]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub track_authorization: Option<String>,
}

impl Track {
    pub fn transcodings(&self) -> &[Transcoding] {
        self.media
            .as_ref()
            .map(|m| m.transcodings.as_slice())
            .unwrap_or_default()
    }

    pub fn has_transcodings(&self) -> bool {
        !self.transcodings().is_empty()
    }

    pub fn artist(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.username.as_deref())
    }

    /// Title and artist are both known
    pub fn is_complete(&self) -> bool {
        self.title.is_some() && self.artist().is_some()
    }
}

/// Playlist or album payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub permalink_url: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub is_album: Option<bool>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

// ============================================================================
// Normalized items
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Track,
    Playlist,
    Album,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Track => "track",
            MediaKind::Playlist => "playlist",
            MediaKind::Album => "album",
        }
    }

    pub fn is_collection(&self) -> bool {
        !matches!(self, MediaKind::Track)
    }
}

/// A resolved track, playlist or album
///
/// For collections `children` holds the tracks in their upstream order,
/// which is also the archive order.
#[derive(Debug, Clone)]
pub struct ResolvedItem {
    pub kind: MediaKind,
    pub id: u64,
    pub title: String,
    pub artist: String,
    /// Milliseconds
    pub duration: Option<u64>,
    pub artwork_url: Option<String>,
    pub album_title: Option<String>,
    pub genre: Option<String>,
    pub permalink_url: Option<String>,
    pub description: Option<String>,
    pub playback_count: Option<u64>,
    pub likes_count: Option<u64>,
    pub children: Vec<ResolvedItem>,
    /// Upstream payload of a track, with its transcodings when known
    pub track: Option<Track>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ResolvedItem {
    pub fn from_track(track: Track) -> Self {
        let avatar = track.user.as_ref().and_then(|u| u.avatar_url.as_deref());
        let album_title = non_empty(track.release_title.as_deref()).or_else(|| {
            non_empty(
                track
                    .publisher_metadata
                    .as_ref()
                    .and_then(|p| p.album_title.as_deref()),
            )
        });

        Self {
            kind: MediaKind::Track,
            id: track.id,
            title: track.title.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            artist: track.artist().unwrap_or(UNKNOWN).to_string(),
            duration: track.duration,
            artwork_url: non_empty(track.artwork_url.as_deref()).or_else(|| non_empty(avatar)),
            album_title,
            genre: non_empty(track.genre.as_deref())
                .or_else(|| non_empty(track.tag_list.as_deref())),
            permalink_url: track.permalink_url.clone(),
            description: track.description.clone(),
            playback_count: track.playback_count,
            likes_count: track.likes_count,
            children: Vec::new(),
            track: Some(track),
        }
    }

    pub fn from_playlist(playlist: Playlist, kind: MediaKind, children: Vec<ResolvedItem>) -> Self {
        let user = playlist.user.unwrap_or_default();

        Self {
            kind,
            id: playlist.id,
            title: playlist.title.unwrap_or_else(|| UNKNOWN.to_string()),
            artist: user.username.unwrap_or_else(|| UNKNOWN.to_string()),
            duration: playlist.duration,
            artwork_url: non_empty(playlist.artwork_url.as_deref())
                .or_else(|| non_empty(user.avatar_url.as_deref())),
            album_title: None,
            genre: non_empty(playlist.genre.as_deref()),
            permalink_url: playlist.permalink_url,
            description: playlist.description,
            playback_count: None,
            likes_count: None,
            children,
            track: None,
        }
    }

    /// Duration in whole seconds
    pub fn duration_seconds(&self) -> Option<u64> {
        self.duration.map(|ms| ms / 1000)
    }

    pub fn is_collection(&self) -> bool {
        self.kind.is_collection()
    }

    /// Upstream payload carries stream variants
    pub fn has_transcodings(&self) -> bool {
        self.track.as_ref().is_some_and(Track::has_transcodings)
    }

    /// JSON view served by `/track-info`
    pub fn info(&self) -> ItemInfo {
        if self.is_collection() {
            ItemInfo::Collection(CollectionInfo {
                kind: self.kind.as_str().to_string(),
                title: self.title.clone(),
                artist: self.artist.clone(),
                description: self.description.clone(),
                artwork_url: self.artwork_url.clone(),
                track_count: self.children.len(),
                tracks: self
                    .children
                    .iter()
                    .map(|child| TrackSummary {
                        title: child.title.clone(),
                        artist: child.artist.clone(),
                        duration: child.duration.unwrap_or(0),
                        id: child.id,
                    })
                    .collect(),
                permalink_url: self.permalink_url.clone(),
                id: self.id,
            })
        } else {
            ItemInfo::Track(TrackInfo {
                kind: self.kind.as_str().to_string(),
                title: self.title.clone(),
                artist: self.artist.clone(),
                duration: self.duration,
                description: self.description.clone(),
                artwork_url: self.artwork_url.clone(),
                playback_count: self.playback_count,
                likes_count: self.likes_count,
                permalink_url: self.permalink_url.clone(),
                id: self.id,
            })
        }
    }
}

// ============================================================================
// JSON views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub kind: String,
    pub title: String,
    pub artist: String,
    pub duration: Option<u64>,
    pub description: Option<String>,
    pub artwork_url: Option<String>,
    pub playback_count: Option<u64>,
    pub likes_count: Option<u64>,
    pub permalink_url: Option<String>,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub title: String,
    pub artist: String,
    pub duration: u64,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub kind: String,
    pub title: String,
    pub artist: String,
    pub description: Option<String>,
    pub artwork_url: Option<String>,
    pub track_count: usize,
    pub tracks: Vec<TrackSummary>,
    pub permalink_url: Option<String>,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ItemInfo {
    Track(TrackInfo),
    Collection(CollectionInfo),
}

/// Playable stream for a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    /// HLS manifest or progressive URL
    pub url: String,
    pub is_protected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transcoding_protection() {
        let transcoding = |url: &str, protocol: &str| -> Transcoding {
            serde_json::from_value(json!({"url": url, "format": {"protocol": protocol}})).unwrap()
        };

        assert!(transcoding("https://x/1/stream/hls", "ctr-encrypted-hls").is_protected());
        assert!(transcoding("https://x/1/stream/hls", "cenc-hls").is_protected());
        assert!(transcoding("https://x/cenc/stream/hls", "hls").is_protected());
        assert!(!transcoding("https://x/1/stream/hls", "hls").is_protected());
    }

    #[test]
    fn test_track_fallbacks() {
        let track: Track = serde_json::from_value(json!({
            "id": 42,
            "title": "Song",
            "user": {"username": "Band", "avatar_url": "https://i1.sndcdn.com/avatars-1-large.jpg"},
            "artwork_url": null,
            "genre": "",
            "tag_list": "ambient drone",
            "publisher_metadata": {"album_title": "Record"},
            "duration": 185_432
        }))
        .unwrap();

        let item = ResolvedItem::from_track(track);
        assert_eq!(item.kind, MediaKind::Track);
        assert_eq!(item.artist, "Band");
        assert_eq!(
            item.artwork_url.as_deref(),
            Some("https://i1.sndcdn.com/avatars-1-large.jpg")
        );
        assert_eq!(item.album_title.as_deref(), Some("Record"));
        assert_eq!(item.genre.as_deref(), Some("ambient drone"));
        assert_eq!(item.duration_seconds(), Some(185));
    }

    #[test]
    fn test_partial_track_uses_placeholders() {
        let track: Track = serde_json::from_value(json!({"id": 7, "user": null})).unwrap();
        assert!(!track.is_complete());

        let item = ResolvedItem::from_track(track);
        assert_eq!(item.title, UNKNOWN);
        assert_eq!(item.artist, UNKNOWN);
        assert!(!item.has_transcodings());
    }

    #[test]
    fn test_streamable_protocols() {
        let transcodings: Vec<Transcoding> = serde_json::from_value(json!([
            {"url": "https://a/1", "format": {"protocol": "hls", "mime_type": "audio/mpeg"}},
            {"url": "https://a/2", "format": {"protocol": "progressive"}},
            {"url": "https://a/3", "format": {"protocol": "ctr-encrypted-hls"}},
            {"url": "https://a/4"}
        ]))
        .unwrap();

        let streamable: Vec<bool> = transcodings.iter().map(|t| t.is_streamable()).collect();
        assert_eq!(streamable, vec![true, false, true, false]);
    }

    #[test]
    fn test_collection_info_shape() {
        let child = ResolvedItem::from_track(Track {
            id: 1,
            title: Some("A".into()),
            duration: Some(1000),
            ..Default::default()
        });
        let playlist = Playlist {
            id: 9,
            title: Some("Mix".into()),
            ..Default::default()
        };
        let item = ResolvedItem::from_playlist(playlist, MediaKind::Album, vec![child]);

        let view = serde_json::to_value(item.info()).unwrap();
        assert_eq!(view["kind"], "album");
        assert_eq!(view["track_count"], 1);
        assert_eq!(view["tracks"][0]["title"], "A");
        assert_eq!(view["tracks"][0]["artist"], UNKNOWN);
        assert_eq!(view["artist"], UNKNOWN);
    }
}
