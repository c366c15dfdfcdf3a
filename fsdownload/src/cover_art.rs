//! Artwork download
//!
//! SoundCloud serves artwork in several sizes selected by a URL suffix.
//! The original URL is tried first, then its 500x500 variants.

use tracing::debug;

/// Smallest body accepted as an image
pub const MIN_IMAGE_SIZE: usize = 100;

const SIZE_SUFFIXES: [&str; 4] = ["-large", "-t67x67", "-t124x124", "-t300x300"];
const PREFERRED_SUFFIX: &str = "-t500x500";

/// URLs to try for `artwork_url`, original first, without duplicates
pub fn cover_art_candidates(artwork_url: &str) -> Vec<String> {
    let mut candidates = vec![artwork_url.to_string()];
    for suffix in SIZE_SUFFIXES {
        let variant = artwork_url.replace(suffix, PREFERRED_SUFFIX);
        if variant != artwork_url && !candidates.contains(&variant) {
            candidates.push(variant);
        }
    }
    candidates
}

/// Whether `data` starts with a JPEG, PNG or GIF signature
pub fn is_valid_image(data: &[u8]) -> bool {
    data.len() >= MIN_IMAGE_SIZE
        && (data.starts_with(&[0xFF, 0xD8])
            || data.starts_with(&[0x89, b'P', b'N', b'G'])
            || data.starts_with(b"GIF"))
}

/// MIME type from the image signature, JPEG when unknown
pub fn image_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(b"GIF") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

/// Downloads the first valid artwork variant
///
/// Failures are logged and yield `None`.
pub async fn fetch_cover_art(client: &reqwest::Client, artwork_url: Option<&str>) -> Option<Vec<u8>> {
    let artwork_url = artwork_url.filter(|u| !u.is_empty())?;

    for url in cover_art_candidates(artwork_url) {
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Cover art request failed for {}: {}", url, e);
                continue;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            continue;
        }

        match response.bytes().await {
            Ok(data) if is_valid_image(&data) => {
                debug!("Downloaded cover art from {} ({} bytes)", url, data.len());
                return Some(data.to_vec());
            }
            Ok(_) => debug!("Ignoring invalid image at {}", url),
            Err(e) => debug!("Failed to read cover art from {}: {}", url, e),
        }
    }

    None
}
