//! Media type table shared by client and server.
//!
//! The client labels uploads by file extension and names saved results by
//! the media type the server answered with; both directions go through the
//! same table so the two ends agree.

use std::path::Path;

/// Extension (lowercase, without dot) to media type.
const MEDIA_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("avi", "video/avi"),
    ("mov", "video/mov"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("mp3", "audio/mp3"),
    ("gif", "image/gif"),
];

/// Default media type for frames that carry no file.
pub const TEXT_PLAIN: &str = "text/plain";

/// Top-level category of a media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Text,
    Other,
}

impl MediaKind {
    /// Classifies a media type string by its top-level type.
    pub fn of(media_type: &str) -> Self {
        let top = media_type.split('/').next().unwrap_or_default();
        match top.trim().to_ascii_lowercase().as_str() {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "image" => Self::Image,
            "text" => Self::Text,
            _ => Self::Other,
        }
    }

    /// Lowercase label used in generated file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Text => "text",
            Self::Other => "file",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Looks up the media type for an extension (case-insensitive, no dot).
pub fn media_type_for_extension(extension: &str) -> Option<&'static str> {
    let extension = extension.to_ascii_lowercase();
    MEDIA_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, media_type)| *media_type)
}

/// Looks up the media type for a file path by its extension.
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(media_type_for_extension)
}

/// Looks up the file extension for a media type.
pub fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    let media_type = media_type.trim().to_ascii_lowercase();
    MEDIA_TYPES
        .iter()
        .find(|(_, mt)| *mt == media_type)
        .map(|(ext, _)| *ext)
}
