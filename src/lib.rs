pub mod downloader;
pub mod logging;

pub use downloader::{
    DownloadError, DownloadRequest, DownloadResult, Downloader, ErrorKind, FetchConfig,
    FormatChoice,
};
