// Downloader configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How yt-dlp is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractorMode {
    /// `python3 -m yt_dlp` (better for YouTube, avoids bot detection)
    Python,
    /// Native `yt-dlp` binary
    Cli,
    /// Python for YouTube when the module is installed, binary otherwise
    #[default]
    Auto,
}

impl fmt::Display for ExtractorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Cli => write!(f, "cli"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ExtractorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "cli" => Ok(Self::Cli),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown extractor mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub mode: ExtractorMode,
    /// Explicit yt-dlp binary; searched for when None
    pub ytdlp_path: Option<String>,
    /// Interpreter used in python mode
    pub python_cmd: String,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to a cookies.txt file
    pub cookies_path: Option<String>,
    /// Browser to pull cookies from (e.g. "chrome")
    pub cookies_from_browser: Option<String>,
    /// Passed to yt-dlp as --socket-timeout
    pub socket_timeout_secs: u32,
    /// Upper bound for the whole catalog lookup
    pub lookup_timeout: Duration,
    /// Upper bound for the transfer; None waits forever
    pub transfer_timeout: Option<Duration>,
    /// Root of the default "videos" directory. Captured once so the
    /// default does not drift if the process changes directory later.
    pub base_dir: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Auto,
            ytdlp_path: None,
            python_cmd: "python3".to_string(),
            proxy: None,
            cookies_path: None,
            cookies_from_browser: None,
            socket_timeout_secs: 15,
            lookup_timeout: Duration::from_secs(60),
            transfer_timeout: None,
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl FetchConfig {
    /// Defaults overlaid with YTDLP_PATH, YTDLP_PYTHON and YTDLP_PROXY
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("YTDLP_PATH") {
            if !path.trim().is_empty() {
                config.ytdlp_path = Some(path);
            }
        }
        if let Ok(python) = std::env::var("YTDLP_PYTHON") {
            if !python.trim().is_empty() {
                config.python_cmd = python;
            }
        }
        if let Ok(proxy) = std::env::var("YTDLP_PROXY") {
            if !proxy.trim().is_empty() {
                config.proxy = Some(proxy);
            }
        }
        config
    }

    pub fn with_mode(mut self, mode: ExtractorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        if path.is_some() {
            self.ytdlp_path = path;
        }
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        if proxy.is_some() {
            self.proxy = proxy;
        }
        self
    }

    pub fn with_cookies_path(mut self, path: Option<String>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn with_cookies_from_browser(mut self, browser: Option<String>) -> Self {
        self.cookies_from_browser = browser;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_transfer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// --proxy / --cookies arguments shared by lookup and transfer
    pub fn network_args(&self) -> Vec<String> {
        let mut args = vec![
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
        ];

        if let Some(path) = &self.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.clone());
        } else if let Some(browser) = &self.cookies_from_browser {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }
}
