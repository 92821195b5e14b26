use serde::{Deserialize, Serialize};
use std::process::Command;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    /// Native yt-dlp executable
    YtDlp,
    /// `yt_dlp` module importable by the configured python
    YtDlpPython,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::YtDlpPython => "python yt_dlp",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager {
    python_cmd: String,
    ytdlp_override: Option<String>,
}

impl ToolManager {
    pub fn new(python_cmd: impl Into<String>, ytdlp_override: Option<String>) -> Self {
        Self {
            python_cmd: python_cmd.into(),
            ytdlp_override,
        }
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let (path, version) = match tool_type {
            ToolType::YtDlp => {
                let path = self.locate_ytdlp();
                let version = path.as_deref().and_then(|p| Self::get_version(p, &[]));
                (path, version)
            }
            ToolType::YtDlpPython => {
                let version = Self::get_version(&self.python_cmd, &["-m", "yt_dlp"]);
                let path = version.as_ref().map(|_| self.python_cmd.clone());
                (path, version)
            }
        };

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::YtDlpPython),
        ]
    }

    /// Whether `python -c "import yt_dlp"` succeeds
    pub fn has_python_module(&self) -> bool {
        match Command::new(&self.python_cmd)
            .args(["-c", "import yt_dlp"])
            .output()
        {
            Ok(out) => out.status.success(),
            Err(_) => false,
        }
    }

    /// Find the yt-dlp executable: override, common paths, then PATH
    pub fn locate_ytdlp(&self) -> Option<String> {
        if let Some(path) = &self.ytdlp_override {
            return Some(path.clone());
        }

        let binary_name = if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" };

        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if std::path::Path::new(&path).exists() {
                return Some(path);
            }
        }

        let which = if cfg!(windows) { "where" } else { "which" };
        if let Ok(output) = Command::new(which).arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }

        None
    }

    fn get_version(program: &str, prefix: &[&str]) -> Option<String> {
        match Command::new(program).args(prefix).arg("--version").output() {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if out.is_empty() {
                    None
                } else {
                    Some(out)
                }
            }
            _ => None,
        }
    }
}
