// Media source trait definition

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{DownloadProgress, MediaCatalog, StreamDescriptor};

/// External capability that knows how to list and retrieve streams
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Name of the source (for logging)
    fn name(&self) -> &'static str;

    /// List the streams available for `url`, in the source's natural order
    async fn resolve(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<MediaCatalog, DownloadError>;

    /// Write `stream` into `destination_dir` as `<file_stem>.<container>`
    /// and return the produced path
    async fn fetch(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        destination_dir: &Path,
        file_stem: &str,
        progress: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError>;
}

/// Progress emitter helper
#[derive(Clone, Default)]
pub struct ProgressEmitter {
    sender: Option<UnboundedSender<DownloadProgress>>,
}

impl ProgressEmitter {
    pub fn new(sender: UnboundedSender<DownloadProgress>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Emitter that drops every update
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, progress: DownloadProgress) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(progress);
        }
    }
}
