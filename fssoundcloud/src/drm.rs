//! Encrypted stream detection
//!
//! Pure string checks applied to stream URLs, HLS manifests and encoder
//! stderr.

/// Marker of common-encryption (CENC) streams
pub const DRM_MARKER: &str = "cenc";

/// Message reported for encrypted tracks
pub const DRM_MESSAGE: &str = "Track is DRM-protected (encrypted) and cannot be downloaded";

/// Protocol fragment of the encrypted HLS variants (`ctr-encrypted-hls`...)
pub const ENCRYPTED_PROTOCOL_MARKER: &str = "encrypted";

/// Returns true when the URL points at an encrypted stream
pub fn is_drm_protected_url(url: &str) -> bool {
    url.to_lowercase().contains(DRM_MARKER)
}

/// Returns true when a transcoding protocol declares encryption
pub fn is_drm_protected_protocol(protocol: &str) -> bool {
    let protocol = protocol.to_lowercase();
    protocol.contains(DRM_MARKER) || protocol.contains(ENCRYPTED_PROTOCOL_MARKER)
}

/// Scans a manifest body or encoder output for DRM indicators
///
/// Returns the client-facing message on a hit.
pub fn check_drm_in_content(content: &str) -> Option<&'static str> {
    let content = content.to_lowercase();

    let encrypted = content.contains(DRM_MARKER)
        || (content.contains("not on whitelist") && content.contains("https"))
        || (content.contains("data:text") && content.contains("wrmheader"));

    encrypted.then_some(DRM_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_marker_is_case_insensitive() {
        assert!(is_drm_protected_url(
            "https://cf-hls-media.sndcdn.com/playlist/abc/CENC/playlist.m3u8"
        ));
        assert!(is_drm_protected_url("https://x/ctr-encrypted-hls/cenc?x=1"));
        assert!(!is_drm_protected_url(
            "https://cf-hls-media.sndcdn.com/playlist/abc.128.mp3/playlist.m3u8"
        ));
    }

    #[test]
    fn test_protocol_marker() {
        assert!(is_drm_protected_protocol("ctr-encrypted-hls"));
        assert!(is_drm_protected_protocol("cbc-encrypted-hls"));
        assert!(is_drm_protected_protocol("CENC-hls"));
        assert!(!is_drm_protected_protocol("hls"));
        assert!(!is_drm_protected_protocol("progressive"));
    }

    #[test]
    fn test_content_indicators() {
        assert!(check_drm_in_content("#EXT-X-KEY:METHOD=SAMPLE-AES,KEYFORMAT=\"cenc\"").is_some());
        assert!(
            check_drm_in_content("Protocol 'https' not on whitelist 'file,crypto,data'!").is_some()
        );
        assert!(check_drm_in_content("URI=\"data:text/plain;base64,WRMHEADER...\"").is_some());

        assert!(check_drm_in_content("#EXTM3U\n#EXTINF:10.0,\nhttps://a/seg1.mp3").is_none());
        // "https" alone is normal in a manifest
        assert!(check_drm_in_content("https://host/seg.mp3").is_none());
        assert!(check_drm_in_content("").is_none());
    }
}
