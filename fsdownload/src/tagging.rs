//! ID3v2.3 tagging of finished MP3 files

use std::path::Path;

use id3::frame::{Picture, PictureType};
use id3::{Tag, TagLike, Version};

use crate::cover_art::image_mime;
use crate::error::Result;

/// Descriptive metadata of a finished track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMetadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub artwork: Option<Vec<u8>>,
}

/// First whitespace-separated token of a genre or tag list
pub fn first_genre(genre: &str) -> Option<&str> {
    genre.split_whitespace().next()
}

/// Writes title, artist, album, genre, track number and front cover
pub fn tag_file(path: &Path, metadata: &AudioMetadata) -> Result<()> {
    let mut tag = Tag::new();

    tag.set_title(metadata.title.as_str());
    tag.set_artist(metadata.artist.as_str());

    if let Some(album) = metadata.album.as_deref().filter(|a| !a.is_empty()) {
        tag.set_album(album);
    }

    if let Some(genre) = metadata.genre.as_deref().and_then(first_genre) {
        tag.set_genre(genre);
    }

    if let Some(n) = metadata.track_number {
        tag.set_track(n);
    }

    if let Some(data) = &metadata.artwork {
        tag.add_frame(Picture {
            mime_type: image_mime(data).to_string(),
            picture_type: PictureType::CoverFront,
            description: String::new(),
            data: data.clone(),
        });
    }

    tag.write_to_path(path, Version::Id3v23)?;
    Ok(())
}
