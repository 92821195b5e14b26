// yt-dlp media source
//
// resolve: `--dump-json` -> MediaCatalog
// fetch:   `-f <format_id> -P <dir> -o "<stem>.%(ext)s"` with progress
//          lines parsed from stdout
//
// Python mode (`python3 -m yt_dlp`) is preferred for YouTube when the module
// is installed; the native binary is used otherwise.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::downloader::config::{ExtractorMode, FetchConfig};
use crate::downloader::diagnostics::{diagnose_error, BlockingReason};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{DownloadProgress, MediaCatalog, StreamDescriptor};
use crate::downloader::tools::ToolManager;
use crate::downloader::traits::{MediaSource, ProgressEmitter};
use crate::downloader::utils::{self, RunError};

/// How a single yt-dlp run is launched
#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    Binary(String),
    PythonModule(String),
}

impl Invocation {
    fn program(&self) -> &str {
        match self {
            Self::Binary(path) => path,
            Self::PythonModule(python) => python,
        }
    }

    fn base_args(&self) -> Vec<String> {
        match self {
            Self::Binary(_) => Vec::new(),
            Self::PythonModule(_) => vec!["-m".to_string(), "yt_dlp".to_string()],
        }
    }
}

/// What the system offers, found on first use
#[derive(Debug, Clone, Default)]
struct DetectedTools {
    ytdlp_path: Option<String>,
    python_available: bool,
}

pub struct YtDlpSource {
    config: FetchConfig,
    tools: OnceCell<DetectedTools>,
}

impl YtDlpSource {
    /// Tools are located lazily, on the first resolve or fetch
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            tools: OnceCell::new(),
        }
    }

    /// Locating yt-dlp runs blocking subprocesses, so it goes to the
    /// blocking pool once and is cached for later calls
    async fn detect_tools(&self) -> &DetectedTools {
        self.tools
            .get_or_init(|| async {
                let mode = self.config.mode;
                let manager = ToolManager::new(
                    self.config.python_cmd.clone(),
                    self.config.ytdlp_path.clone(),
                );

                let found = tokio::task::spawn_blocking(move || DetectedTools {
                    ytdlp_path: manager.locate_ytdlp(),
                    python_available: match mode {
                        ExtractorMode::Cli => false,
                        _ => manager.has_python_module(),
                    },
                })
                .await
                .unwrap_or_else(|e| {
                    warn!("[yt-dlp] Tool detection failed: {}", e);
                    DetectedTools::default()
                });

                debug!(
                    "[yt-dlp] mode={} binary={:?} python_module={}",
                    mode, found.ytdlp_path, found.python_available
                );
                found
            })
            .await
    }

    fn invocation_for(&self, found: &DetectedTools, url: &str) -> Result<Invocation, String> {
        let binary = || {
            Invocation::Binary(
                found
                    .ytdlp_path
                    .clone()
                    .unwrap_or_else(|| "yt-dlp".to_string()),
            )
        };

        match self.config.mode {
            ExtractorMode::Python if found.python_available => {
                Ok(Invocation::PythonModule(self.config.python_cmd.clone()))
            }
            ExtractorMode::Python => Err(format!(
                "Python yt_dlp module not installed for {}",
                self.config.python_cmd
            )),
            ExtractorMode::Cli => Ok(binary()),
            ExtractorMode::Auto => {
                if utils::is_youtube_url(url) && found.python_available {
                    Ok(Invocation::PythonModule(self.config.python_cmd.clone()))
                } else {
                    Ok(binary())
                }
            }
        }
    }

    fn lookup_args(&self, invocation: &Invocation, url: &str) -> Vec<String> {
        let mut args = invocation.base_args();
        args.extend(
            ["--dump-json", "--no-playlist", "--no-warnings"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.extend(self.config.network_args());
        args.push(url.to_string());
        args
    }

    fn fetch_args(
        &self,
        invocation: &Invocation,
        url: &str,
        stream: &StreamDescriptor,
        destination_dir: &Path,
        file_stem: &str,
    ) -> Vec<String> {
        let mut args = invocation.base_args();
        args.extend([
            "-f".to_string(),
            stream.format_id.clone(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-warnings".to_string(),
            // Same-named files are replaced, never suffixed
            "--force-overwrites".to_string(),
            "-P".to_string(),
            destination_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            output_template(file_stem),
        ]);
        args.extend(self.config.network_args());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<MediaCatalog, DownloadError> {
        let found = self.detect_tools().await;
        let invocation = self
            .invocation_for(found, url)
            .map_err(|e| DownloadError::lookup(url, e))?;
        let args = self.lookup_args(&invocation, url);
        info!("[yt-dlp] Resolving {} via {}", url, invocation.program());
        debug!("[yt-dlp] {} {}", invocation.program(), args.join(" "));

        let output = utils::run_output_with_timeout(
            invocation.program(),
            &args,
            self.config.lookup_timeout,
            cancel,
        )
        .await
        .map_err(|e| match e {
            RunError::Cancelled => DownloadError::Cancelled,
            other => DownloadError::lookup(url, other.to_string()),
        })?;

        if !output.status.success() {
            let stderr = output.stderr.trim();
            warn!("[yt-dlp] Lookup failed ({}): {}", output.status, stderr);
            let message = if stderr.is_empty() {
                format!("yt-dlp exited with {}", output.status)
            } else {
                stderr.to_string()
            };
            return Err(DownloadError::lookup(url, message));
        }

        parse_catalog(&output.stdout).map_err(|e| DownloadError::lookup(url, e))
    }

    async fn fetch(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        destination_dir: &Path,
        file_stem: &str,
        progress: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let found = self.detect_tools().await;
        let invocation = self
            .invocation_for(found, url)
            .map_err(DownloadError::TransferFailure)?;
        let args = self.fetch_args(&invocation, url, stream, destination_dir, file_stem);
        debug!("[yt-dlp] {} {}", invocation.program(), args.join(" "));

        progress.emit(DownloadProgress {
            percent: 0.0,
            status: format!("Starting download of format {}...", stream.format_id),
        });

        let mut reported_path: Option<PathBuf> = None;
        let (status, stderr) = utils::run_streaming(
            invocation.program(),
            &args,
            self.config.transfer_timeout,
            cancel,
            |line| {
                if let Some(path) = parse_destination(line) {
                    reported_path = Some(path);
                }
                if let Some(update) = parse_ytdlp_progress(line) {
                    progress.emit(update);
                }
            },
        )
        .await
        .map_err(|e| match e {
            RunError::Cancelled => DownloadError::Cancelled,
            other => DownloadError::TransferFailure(other.to_string()),
        })?;

        if !status.success() {
            let stderr = stderr.trim();
            warn!("[yt-dlp] Transfer failed ({}): {}", status, stderr);
            let hint = match diagnose_error(stderr) {
                Some(reason) if reason != BlockingReason::Unknown => {
                    format!(" [{}]", reason.description())
                }
                _ => String::new(),
            };
            return Err(DownloadError::TransferFailure(format!(
                "yt-dlp exited with {}{}: {}",
                status,
                hint,
                stderr.lines().last().unwrap_or("")
            )));
        }

        let path = reported_path.unwrap_or_else(|| {
            destination_dir.join(format!("{}.{}", file_stem, stream.container_extension))
        });

        if tokio::fs::metadata(&path).await.is_err() {
            return Err(DownloadError::TransferFailure(format!(
                "yt-dlp reported success but {} does not exist",
                path.display()
            )));
        }

        progress.emit(DownloadProgress {
            percent: 100.0,
            status: "Download complete!".to_string(),
        });

        Ok(path)
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    formats: Option<Vec<RawFormat>>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
}

fn codec_present(codec: &Option<String>) -> bool {
    codec
        .as_deref()
        .map_or(false, |c| !c.is_empty() && c != "none")
}

/// Turn `--dump-json` output into a catalog.
///
/// yt-dlp lists formats from worst to best; the catalog keeps them best
/// first so "first match" means the preferred match.
fn parse_catalog(stdout: &str) -> Result<MediaCatalog, String> {
    let raw: RawInfo =
        serde_json::from_str(stdout.trim()).map_err(|e| format!("Invalid JSON: {}", e))?;

    let formats = raw
        .formats
        .ok_or_else(|| "No formats array in yt-dlp output".to_string())?;

    let streams = formats
        .into_iter()
        .rev()
        .filter_map(|f| {
            let format_id = f.format_id?;
            let has_audio = codec_present(&f.acodec);
            let has_video = codec_present(&f.vcodec);
            Some(StreamDescriptor {
                format_id,
                container_extension: f.ext.unwrap_or_default(),
                has_audio,
                has_video,
                is_progressive: has_audio && has_video,
            })
        })
        .collect();

    Ok(MediaCatalog {
        title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
        streams,
    })
}

/// `-o` value for a sanitized stem; `%` must be doubled for yt-dlp
fn output_template(file_stem: &str) -> String {
    format!("{}.%(ext)s", file_stem.replace('%', "%%"))
}

/// Parse yt-dlp progress line like:
/// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32
fn parse_ytdlp_progress(line: &str) -> Option<DownloadProgress> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)(?:\s+at\s+(\S+/s))?(?:\s+ETA\s+(\S+))?"
        ).unwrap();
    }

    let caps = PROGRESS_RE.captures(line)?;
    let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
    let size = caps.get(2).map(|m| m.as_str()).unwrap_or("?");

    let status = match (caps.get(3), caps.get(4)) {
        (Some(speed), Some(eta)) => format!(
            "{:.1}% of {} @ {} ETA {}",
            percent,
            size,
            speed.as_str(),
            eta.as_str()
        ),
        (Some(speed), None) => format!("{:.1}% of {} @ {}", percent, size, speed.as_str()),
        _ => format!("{:.1}% of {}", percent, size),
    };

    Some(DownloadProgress { percent, status })
}

/// Path announced by a "Destination:" or "already been downloaded" line
fn parse_destination(line: &str) -> Option<PathBuf> {
    lazy_static::lazy_static! {
        static ref DEST_RE: Regex = Regex::new(r"^\[download\]\s+Destination:\s+(.+)$").unwrap();
        static ref ALREADY_RE: Regex =
            Regex::new(r"^\[download\]\s+(.+) has already been downloaded").unwrap();
    }

    DEST_RE
        .captures(line)
        .or_else(|| ALREADY_RE.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| PathBuf::from(m.as_str().trim()))
}
