// Common data models for the downloader

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What the user wants out of the video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatChoice {
    /// Single progressive mp4 carrying audio and video
    #[default]
    AvCombined,
    /// Audio-only track, renamed to .mp3
    AudioOnly,
}

impl FormatChoice {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AvCombined => "mp4 (Audio and Video)",
            Self::AudioOnly => "mp3 (Audio Only)",
        }
    }

    /// Extension the final file is expected to carry
    pub fn target_extension(&self) -> &'static str {
        match self {
            Self::AvCombined => "mp4",
            Self::AudioOnly => "mp3",
        }
    }
}

impl fmt::Display for FormatChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One user-initiated download. Immutable once handed to the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub source_url: String,
    pub format_choice: FormatChoice,
    /// Empty means the default "videos" directory
    #[serde(default)]
    pub destination_dir: String,
}

impl DownloadRequest {
    pub fn new(source_url: impl Into<String>, format_choice: FormatChoice) -> Self {
        Self {
            source_url: source_url.into(),
            format_choice,
            destination_dir: String::new(),
        }
    }

    pub fn with_destination(mut self, dir: impl Into<String>) -> Self {
        self.destination_dir = dir.into();
        self
    }
}

/// One retrievable encoding of a media item, as reported by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Source-specific handle (yt-dlp format id, e.g. "18", "140")
    pub format_id: String,
    /// Native container extension without the dot (mp4, m4a, webm)
    pub container_extension: String,
    pub has_audio: bool,
    pub has_video: bool,
    /// Single file carrying both audio and video
    pub is_progressive: bool,
}

impl StreamDescriptor {
    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }
}

/// Everything resolve() knows about a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCatalog {
    pub title: String,
    /// Natural order of the source; selection picks the first match
    pub streams: Vec<StreamDescriptor>,
}

/// Outcome of a completed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub final_file_path: PathBuf,
    pub media_title: String,
}

/// Download progress information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: f32,
    pub status: String,
}
