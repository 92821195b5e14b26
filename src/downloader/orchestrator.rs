// Resolve -> select -> fetch -> finalize

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::backends::YtDlpSource;
use super::config::FetchConfig;
use super::errors::DownloadError;
use super::format_selector::FormatSelector;
use super::models::{DownloadRequest, DownloadResult, FormatChoice, StreamDescriptor};
use super::traits::{MediaSource, ProgressEmitter};
use super::utils;

pub struct Downloader {
    source: Box<dyn MediaSource>,
    base_dir: PathBuf,
    home_dir: Option<PathBuf>,
    progress: ProgressEmitter,
    /// One request at a time; later callers wait their turn
    in_flight: Mutex<()>,
}

impl Downloader {
    pub fn new(source: Box<dyn MediaSource>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            base_dir: base_dir.into(),
            home_dir: dirs::home_dir(),
            progress: ProgressEmitter::silent(),
            in_flight: Mutex::new(()),
        }
    }

    /// Downloader backed by yt-dlp
    pub fn from_config(config: FetchConfig) -> Self {
        let base_dir = config.base_dir.clone();
        Self::new(Box::new(YtDlpSource::new(config)), base_dir)
    }

    /// Root for relative custom destinations (defaults to the user's home)
    pub fn with_home_dir(mut self, home: Option<PathBuf>) -> Self {
        self.home_dir = home;
        self
    }

    pub fn with_progress(mut self, progress: ProgressEmitter) -> Self {
        self.progress = progress;
        self
    }

    pub async fn resolve_and_fetch(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadResult, DownloadError> {
        self.resolve_and_fetch_cancellable(request, &CancellationToken::new())
            .await
    }

    /// Same as `resolve_and_fetch`, aborting with `Cancelled` once
    /// `cancel` fires. A running yt-dlp child is killed.
    pub async fn resolve_and_fetch_cancellable(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, DownloadError> {
        let _guard = tokio::select! {
            guard = self.in_flight.lock() => guard,
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        };
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let url = utils::validate_source_url(&request.source_url)?;
        info!(
            "[Downloader] {} as {} via {}",
            url,
            request.format_choice,
            self.source.name()
        );

        let catalog = self.source.resolve(&url, cancel).await?;
        let stream = FormatSelector::select(&catalog, request.format_choice)?;
        info!(
            "[Downloader] \"{}\": selected format {} ({})",
            catalog.title, stream.format_id, stream.container_extension
        );

        let destination = utils::resolve_destination_dir(
            &self.base_dir,
            &request.destination_dir,
            self.home_dir.as_deref(),
        );
        tokio::fs::create_dir_all(&destination)
            .await
            .map_err(|source| DownloadError::Filesystem {
                path: destination.clone(),
                source,
            })?;

        let file_stem = utils::sanitize_filename(&catalog.title);
        warn_on_overwrite(&destination, &file_stem, stream, request.format_choice).await;

        let downloaded = self
            .source
            .fetch(&url, stream, &destination, &file_stem, &self.progress, cancel)
            .await?;

        let final_path = self.finalize(downloaded, request.format_choice).await?;
        info!("[Downloader] ✓ Saved {}", final_path.display());

        Ok(DownloadResult {
            final_file_path: absolutize(final_path),
            media_title: catalog.title,
        })
    }

    /// Audio downloads get a .mp3 extension. Container rename only, the
    /// bytes are neither re-encoded nor checked.
    async fn finalize(
        &self,
        downloaded: PathBuf,
        choice: FormatChoice,
    ) -> Result<PathBuf, DownloadError> {
        let target = choice.target_extension();
        if choice != FormatChoice::AudioOnly || utils::has_extension(&downloaded, target) {
            return Ok(downloaded);
        }

        match utils::replace_extension(&downloaded, target).await {
            Ok(renamed) => {
                info!(
                    "[Downloader] Renamed {} -> {}",
                    downloaded.display(),
                    renamed.display()
                );
                Ok(renamed)
            }
            Err(e) => {
                warn!(
                    "[Downloader] ✗ Rename failed, file kept at {}: {}",
                    downloaded.display(),
                    e
                );
                Err(e)
            }
        }
    }
}

async fn warn_on_overwrite(
    destination: &Path,
    file_stem: &str,
    stream: &StreamDescriptor,
    choice: FormatChoice,
) {
    let mut candidates = vec![destination.join(format!(
        "{}.{}",
        file_stem, stream.container_extension
    ))];
    if choice == FormatChoice::AudioOnly {
        candidates.push(destination.join(format!("{}.mp3", file_stem)));
    }

    for path in candidates {
        if tokio::fs::metadata(&path).await.is_ok() {
            warn!("[Downloader] Overwriting existing file {}", path.display());
        }
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::errors::ErrorKind;
    use crate::downloader::models::MediaCatalog;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn stream(id: &str, ext: &str, audio: bool, video: bool) -> StreamDescriptor {
        StreamDescriptor {
            format_id: id.to_string(),
            container_extension: ext.to_string(),
            has_audio: audio,
            has_video: video,
            is_progressive: audio && video,
        }
    }

    /// In-memory source: writes `payload` as the fetched file
    struct FakeSource {
        catalog: Option<MediaCatalog>,
        payload: &'static [u8],
        fetch_delay: Option<Duration>,
        /// Simulated transfer error, returned before anything is written
        fetch_error: Option<&'static str>,
        resolves: AtomicUsize,
        fetches: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl FakeSource {
        fn with_catalog(title: &str, streams: Vec<StreamDescriptor>) -> Self {
            Self {
                catalog: Some(MediaCatalog {
                    title: title.to_string(),
                    streams,
                }),
                payload: b"media bytes",
                fetch_delay: None,
                fetch_error: None,
                resolves: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }

        fn unreachable() -> Self {
            Self {
                catalog: None,
                ..Self::with_catalog("", Vec::new())
            }
        }
    }

    #[async_trait]
    impl MediaSource for std::sync::Arc<FakeSource> {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn resolve(
            &self,
            url: &str,
            _cancel: &CancellationToken,
        ) -> Result<MediaCatalog, DownloadError> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            self.catalog.clone().ok_or_else(|| {
                DownloadError::lookup(url, "Unable to download webpage: connection refused")
            })
        }

        async fn fetch(
            &self,
            _url: &str,
            stream: &StreamDescriptor,
            destination_dir: &Path,
            file_stem: &str,
            _progress: &ProgressEmitter,
            _cancel: &CancellationToken,
        ) -> Result<PathBuf, DownloadError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.fetch_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(message) = self.fetch_error {
                self.active.fetch_sub(1, Ordering::SeqCst);
                return Err(DownloadError::TransferFailure(message.to_string()));
            }

            let path =
                destination_dir.join(format!("{}.{}", file_stem, stream.container_extension));
            let result = tokio::fs::write(&path, self.payload)
                .await
                .map(|_| path)
                .map_err(|e| DownloadError::TransferFailure(e.to_string()));

            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn downloader(
        source: &std::sync::Arc<FakeSource>,
        base: &Path,
    ) -> Downloader {
        Downloader::new(Box::new(source.clone()), base).with_home_dir(None)
    }

    #[tokio::test]
    async fn test_audio_only_default_dir_renames_to_mp3() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("140", "m4a", true, false)],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("X", FormatChoice::AudioOnly);
        let result = dl.resolve_and_fetch(&req).await.unwrap();

        assert_eq!(result.media_title, "Song");
        assert!(result.final_file_path.ends_with("videos/Song.mp3"));
        assert_eq!(result.final_file_path.parent().unwrap(), base.path().join("videos"));
        assert!(result.final_file_path.is_absolute());
        assert_eq!(std::fs::read(&result.final_file_path).unwrap(), b"media bytes");
        assert!(!base.path().join("videos/Song.m4a").exists());
    }

    #[tokio::test]
    async fn test_av_combined_yields_progressive_mp4() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Clip: Live?",
            vec![
                stream("137", "mp4", false, true),
                stream("43", "webm", true, true),
                stream("18", "mp4", true, true),
            ],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("https://youtu.be/abc", FormatChoice::AvCombined);
        let result = dl.resolve_and_fetch(&req).await.unwrap();

        assert_eq!(result.media_title, "Clip: Live?");
        assert_eq!(result.final_file_path, base.path().join("videos/Clip Live.mp4"));
        assert!(result.final_file_path.exists());
    }

    #[tokio::test]
    async fn test_no_progressive_mp4_writes_nothing() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("137", "mp4", false, true), stream("140", "m4a", true, false)],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("https://youtu.be/abc", FormatChoice::AvCombined);
        let err = dl.resolve_and_fetch(&req).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoMatchingStream);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert!(!base.path().join("videos").exists());
    }

    #[tokio::test]
    async fn test_lookup_failure_writes_nothing() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::unreachable());
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("https://youtu.be/abc", FormatChoice::AudioOnly);
        let err = dl.resolve_and_fetch(&req).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LookupFailure);
        assert!(err.suggestion().is_some());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert!(!base.path().join("videos").exists());
    }

    #[tokio::test]
    async fn test_empty_url_never_reaches_source() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog("Song", Vec::new()));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("   ", FormatChoice::AudioOnly);
        let err = dl.resolve_and_fetch(&req).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(source.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mp3_source_is_not_renamed() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("a", "mp3", true, false)],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("X", FormatChoice::AudioOnly);
        let result = dl.resolve_and_fetch(&req).await.unwrap();
        assert_eq!(result.final_file_path, base.path().join("videos/Song.mp3"));
    }

    #[tokio::test]
    async fn test_existing_file_is_overwritten() {
        let base = tempfile::tempdir().unwrap();
        let videos = base.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        std::fs::write(videos.join("Song.mp3"), b"old").unwrap();

        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("140", "m4a", true, false)],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("X", FormatChoice::AudioOnly);
        let result = dl.resolve_and_fetch(&req).await.unwrap();
        assert_eq!(std::fs::read(result.final_file_path).unwrap(), b"media bytes");
    }

    #[tokio::test]
    async fn test_rename_failure_keeps_download() {
        let base = tempfile::tempdir().unwrap();
        // A non-empty directory squatting on the target name blocks the rename
        let blocker = base.path().join("videos/Song.mp3");
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("140", "m4a", true, false)],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("X", FormatChoice::AudioOnly);
        let err = dl.resolve_and_fetch(&req).await.unwrap_err();

        match err {
            DownloadError::RenameFailure { downloaded, .. } => {
                assert_eq!(downloaded, base.path().join("videos/Song.m4a"));
                assert_eq!(std::fs::read(downloaded).unwrap(), b"media bytes");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_relative_destination_uses_home() {
        let base = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("18", "mp4", true, true)],
        ));
        let dl = Downloader::new(Box::new(source.clone()), base.path())
            .with_home_dir(Some(home.path().to_path_buf()));

        let req = DownloadRequest::new("X", FormatChoice::AvCombined).with_destination("Clips");
        let result = dl.resolve_and_fetch(&req).await.unwrap();
        assert_eq!(result.final_file_path, home.path().join("Clips/Song.mp4"));
    }

    #[tokio::test]
    async fn test_same_catalog_same_stream() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("249", "webm", true, false), stream("140", "m4a", true, false)],
        ));
        let dl = downloader(&source, base.path());
        let req = DownloadRequest::new("X", FormatChoice::AudioOnly);

        let first = dl.resolve_and_fetch(&req).await.unwrap();
        let second = dl.resolve_and_fetch(&req).await.unwrap();
        assert_eq!(first, second);
        assert!(!base.path().join("videos/Song.webm").exists());
    }

    #[tokio::test]
    async fn test_requests_run_one_at_a_time() {
        let base = tempfile::tempdir().unwrap();
        let mut fake = FakeSource::with_catalog("Song", vec![stream("18", "mp4", true, true)]);
        fake.fetch_delay = Some(Duration::from_millis(50));
        let source = std::sync::Arc::new(fake);
        let dl = downloader(&source, base.path());

        let a = DownloadRequest::new("X", FormatChoice::AvCombined);
        let b = DownloadRequest::new("Y", FormatChoice::AvCombined).with_destination(
            base.path().join("other").to_string_lossy().to_string(),
        );
        let (ra, rb) = tokio::join!(dl.resolve_and_fetch(&a), dl.resolve_and_fetch(&b));

        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("18", "mp4", true, true)],
        ));
        let dl = downloader(&source, base.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let req = DownloadRequest::new("X", FormatChoice::AvCombined);
        let err = dl.resolve_and_fetch_cancellable(&req, &cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(source.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transfer_failure_leaves_no_file() {
        let base = tempfile::tempdir().unwrap();
        let mut fake = FakeSource::with_catalog("Song", vec![stream("140", "m4a", true, false)]);
        fake.fetch_error = Some("HTTP Error 403: Forbidden");
        let source = std::sync::Arc::new(fake);
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("X", FormatChoice::AudioOnly);
        let err = dl.resolve_and_fetch(&req).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransferFailure);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        let videos = base.path().join("videos");
        assert!(!videos.join("Song.m4a").exists());
        assert!(!videos.join("Song.mp3").exists());
    }

    #[tokio::test]
    async fn test_destination_that_is_a_file_is_filesystem_error() {
        let base = tempfile::tempdir().unwrap();
        let occupied = base.path().join("not-a-dir");
        std::fs::write(&occupied, b"x").unwrap();

        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("18", "mp4", true, true)],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("X", FormatChoice::AvCombined)
            .with_destination(occupied.to_string_lossy().to_string());
        let err = dl.resolve_and_fetch(&req).await.unwrap_err();

        match &err {
            DownloadError::Filesystem { path, .. } => assert_eq!(path, &occupied),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_uppercase_mp3_is_normalized() {
        let base = tempfile::tempdir().unwrap();
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            "Song",
            vec![stream("a", "MP3", true, false)],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("X", FormatChoice::AudioOnly);
        let result = dl.resolve_and_fetch(&req).await.unwrap();
        assert_eq!(result.final_file_path.extension().unwrap(), "mp3");
        assert!(result.final_file_path.exists());
    }

    #[tokio::test]
    async fn test_long_cjk_title_fits_filesystem() {
        let base = tempfile::tempdir().unwrap();
        let title = "日".repeat(100);
        let source = std::sync::Arc::new(FakeSource::with_catalog(
            &title,
            vec![stream("140", "m4a", true, false)],
        ));
        let dl = downloader(&source, base.path());

        let req = DownloadRequest::new("X", FormatChoice::AudioOnly);
        let result = dl.resolve_and_fetch(&req).await.unwrap();

        assert_eq!(result.media_title, title);
        let name = result.final_file_path.file_name().unwrap().to_str().unwrap();
        assert!(name.len() < 255);
        assert!(name.ends_with(".mp3"));
        assert!(result.final_file_path.exists());
    }
}
