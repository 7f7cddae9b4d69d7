//! vtree - 가상 파일 트리 탐색 라이브러리
//!
//! Presents the local filesystem, installed applications and archive
//! contents as a single lazily expanded tree. Archive nodes are extracted
//! on demand into a per-archive cache directory, with every entry path
//! validated before anything touches the disk.

pub mod core;
pub mod models;
pub mod system;
pub mod utils;

pub use crate::core::config::WalkerConfig;
pub use crate::core::walker::{ExpandTask, TreeWalker};
pub use crate::models::file_entry::{FileEntry, FileType};
pub use crate::models::node::{ExpandContext, NodeKind, VirtualNode};
pub use crate::system::archive::{
    detect_archive_format, extract, list_entries, ArchiveEntry, ArchiveFormat, ExtractionSummary,
    ProgressEvent,
};
pub use crate::system::provider::{AppInfo, AppProvider, NoAppProvider, PathResolver};
pub use crate::system::sniffer::{classify, FileKind};
pub use crate::utils::error::{Result, VtreeError};
