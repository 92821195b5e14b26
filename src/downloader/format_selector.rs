// FormatSelector - maps a FormatChoice to exactly one stream
//
// Policy:
// - AudioOnly: first stream with audio and no video
// - AvCombined: first progressive stream in an mp4 container
//
// "First" is the catalog's own order, so the same catalog always yields the
// same stream.

use super::errors::DownloadError;
use super::models::{FormatChoice, MediaCatalog, StreamDescriptor};

pub struct FormatSelector;

impl FormatSelector {
    pub fn select<'a>(
        catalog: &'a MediaCatalog,
        choice: FormatChoice,
    ) -> Result<&'a StreamDescriptor, DownloadError> {
        match choice {
            FormatChoice::AudioOnly => catalog
                .streams
                .iter()
                .find(|s| s.is_audio_only())
                .ok_or_else(|| {
                    DownloadError::NoMatchingStream(format!(
                        "no audio-only stream for \"{}\"",
                        catalog.title
                    ))
                }),
            FormatChoice::AvCombined => catalog
                .streams
                .iter()
                .find(|s| s.is_progressive && Self::is_mp4(s))
                .ok_or_else(|| {
                    DownloadError::NoMatchingStream(format!(
                        "no progressive mp4 stream for \"{}\"",
                        catalog.title
                    ))
                }),
        }
    }

    fn is_mp4(stream: &StreamDescriptor) -> bool {
        stream.container_extension.eq_ignore_ascii_case("mp4")
    }
}
