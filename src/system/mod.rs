// System Layer
pub mod archive;
pub mod filesystem;
pub mod path_guard;
pub mod provider;
pub mod sniffer;

pub use archive::{
    detect_archive_format, extract, list_entries, ArchiveEntry, ArchiveFormat, ExtractionSummary,
    ProgressEvent,
};
pub use provider::{AppInfo, AppProvider, IconHandle, LocalResolver, NoAppProvider, PathResolver};
pub use sniffer::{classify, FileKind};
