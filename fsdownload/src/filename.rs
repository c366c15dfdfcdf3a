//! Filename sanitization

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FORBIDDEN: Regex = Regex::new(r#"[<>:"/\\|?*]"#).unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Removes characters forbidden in filenames, collapses whitespace runs to a
/// single space and truncates to `max_len` characters
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let cleaned = FORBIDDEN.replace_all(name, "");
    let collapsed = WHITESPACE.replace_all(&cleaned, " ");
    collapsed.chars().take(max_len).collect()
}

/// `"{artist} - {title}.mp3"`, used for single track downloads
pub fn track_filename(artist: &str, title: &str, max_len: usize) -> String {
    sanitize_filename(&format!("{} - {}.mp3", artist, title), max_len)
}

/// `"{title} - {artist}.mp3"`, used for archive entries
pub fn entry_filename(title: &str, artist: &str, max_len: usize) -> String {
    sanitize_filename(&format!("{} - {}.mp3", title, artist), max_len)
}

/// `"{title}.zip"`, used for collection downloads
pub fn archive_filename(title: &str, max_len: usize) -> String {
    sanitize_filename(&format!("{}.zip", title), max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_characters_are_removed() {
        assert_eq!(
            sanitize_filename(r#"a<b>c:d"e/f\g|h?i*j"#, 200),
            "abcdefghij"
        );
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        assert_eq!(sanitize_filename("a \t\n  b", 200), "a b");
    }

    #[test]
    fn test_truncation_counts_characters() {
        let long = "é".repeat(300);
        assert_eq!(sanitize_filename(&long, 200).chars().count(), 200);
    }

    #[test]
    fn test_download_names() {
        assert_eq!(track_filename("AC/DC", "Back: In Black", 200), "ACDC - Back In Black.mp3");
        assert_eq!(entry_filename("Song", "Band", 200), "Song - Band.mp3");
        assert_eq!(archive_filename("Best of?", 200), "Best of.zip");
    }
}
