// Helper functions shared by the orchestrator and the yt-dlp source

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::errors::DownloadError;

/// Name of the directory used when the user leaves the path empty
pub const DEFAULT_DOWNLOAD_DIR: &str = "videos";

const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
/// Stem budget in bytes. File names are limited to 255 bytes and yt-dlp
/// appends `.fNNN`, the container and `.part` while transferring.
const MAX_STEM_BYTES: usize = 180;
const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to capture {0} of child process")]
    Pipe(&'static str),
    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Timed out after {0}s")]
    TimedOut(u64),
    #[error("Cancelled")]
    Cancelled,
}

/// Captured result of a finished child process
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

async fn sleep_or_forever(limit: Option<Duration>) {
    match limit {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run a command, feeding each stdout line to `on_line` as it arrives.
///
/// The child is killed when `limit` elapses or `cancel` fires. Stdout is
/// drained before the exit status is collected so trailing lines are not
/// lost.
pub async fn run_streaming<F>(
    program: &str,
    args: &[String],
    limit: Option<Duration>,
    cancel: &CancellationToken,
    mut on_line: F,
) -> Result<(ExitStatus, String), RunError>
where
    F: FnMut(&str),
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout_pipe = child.stdout.take().ok_or(RunError::Pipe("stdout"))?;
    let mut stderr_pipe = child.stderr.take().ok_or(RunError::Pipe("stderr"))?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    });

    let mut lines = BufReader::new(stdout_pipe).lines();
    let mut stdout_open = true;
    let deadline = sleep_or_forever(limit);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdout_open => match line {
                Ok(Some(line)) => on_line(&line),
                Ok(None) => stdout_open = false,
                Err(e) => {
                    debug!("[process] stdout of {} unreadable: {}", program, e);
                    stdout_open = false;
                }
            },
            status = child.wait(), if !stdout_open => {
                let status = status.map_err(|source| RunError::Wait {
                    program: program.to_string(),
                    source,
                })?;
                let stderr = stderr_task.await.unwrap_or_default();
                return Ok((status, stderr));
            }
            _ = &mut deadline => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(RunError::TimedOut(limit.map(|d| d.as_secs()).unwrap_or_default()));
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(RunError::Cancelled);
            }
        }
    }
}

/// Run command with timeout and collect its whole output
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, RunError> {
    let mut stdout = String::new();
    let (status, stderr) = run_streaming(program, args, Some(limit), cancel, |line| {
        stdout.push_str(line);
        stdout.push('\n');
    })
    .await?;

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}

/// Accepts an http(s) URL with a host, or a bare video id that yt-dlp
/// resolves on its own.
pub fn validate_source_url(raw: &str) -> Result<String, DownloadError> {
    lazy_static::lazy_static! {
        static ref VIDEO_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DownloadError::InvalidInput("URL is empty".to_string()));
    }

    if !trimmed.contains("://") {
        if VIDEO_ID_RE.is_match(trimmed) {
            return Ok(trimmed.to_string());
        }
        return Err(DownloadError::InvalidInput(format!(
            "Not a URL or video id: {}",
            trimmed
        )));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| DownloadError::InvalidInput(format!("Malformed URL {}: {}", trimmed, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DownloadError::InvalidInput(format!(
            "Unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(DownloadError::InvalidInput(format!("URL has no host: {}", trimmed)));
    }

    Ok(parsed.to_string())
}

/// Check if URL points at YouTube (bare ids count)
pub fn is_youtube_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("youtube.com") || lower.contains("youtu.be") || !lower.contains("://")
}

/// Where a download should land.
///
/// - empty: `<base>/videos`
/// - `~` or `~/x`: under the home directory
/// - absolute: as given
/// - other relative paths: under the home directory, falling back to `base`
pub fn resolve_destination_dir(base: &Path, raw: &str, home: Option<&Path>) -> PathBuf {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return base.join(DEFAULT_DOWNLOAD_DIR);
    }

    let root = home.unwrap_or(base);

    if trimmed == "~" {
        return root.to_path_buf();
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        return root.join(rest);
    }

    let path = Path::new(trimmed);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Deterministic, filesystem-safe file stem for a media title
pub fn sanitize_filename(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if ILLEGAL_FILENAME_CHARS.contains(&c) || c.is_control() {
                None
            } else {
                Some(c)
            }
        })
        .collect();

    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c == ' ');
    let mut name = truncate_to_bytes(trimmed, MAX_STEM_BYTES)
        .trim_end_matches(|c: char| c == '.' || c == ' ')
        .to_string();

    if name.is_empty() {
        return "download".to_string();
    }

    let upper_stem = name.split('.').next().unwrap_or("").to_uppercase();
    if WINDOWS_RESERVED.contains(&upper_stem.as_str()) {
        name.insert(0, '_');
    }

    name
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char
fn truncate_to_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Exact, case-sensitive extension check
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e == ext)
}

/// Rename `path` in place to carry `ext`. Bytes are untouched.
pub async fn replace_extension(path: &Path, ext: &str) -> Result<PathBuf, DownloadError> {
    let target = path.with_extension(ext);
    tokio::fs::rename(path, &target)
        .await
        .map_err(|source| DownloadError::RenameFailure {
            downloaded: path.to_path_buf(),
            source,
        })?;
    Ok(target)
}
