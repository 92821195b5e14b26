// Downloader module - format selection and download finalization

pub mod backends;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod traits;
pub mod utils;

pub use config::{ExtractorMode, FetchConfig};
pub use diagnostics::BlockingReason;
pub use errors::{DownloadError, ErrorKind};
pub use format_selector::FormatSelector;
pub use models::{
    DownloadProgress, DownloadRequest, DownloadResult, FormatChoice, MediaCatalog,
    StreamDescriptor,
};
pub use orchestrator::Downloader;
pub use traits::{MediaSource, ProgressEmitter};
