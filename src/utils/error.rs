use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VtreeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 보안 위반: 전체 추출 작업을 중단시킨다.
    #[error("entry {entry:?} escapes extraction root {}", root.display())]
    Traversal { root: PathBuf, entry: String },

    #[error("cannot read entry {entry:?} in {}: {reason}", path.display())]
    EntryRead {
        path: PathBuf,
        entry: String,
        reason: String,
    },

    #[error("unsupported archive format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// 동일 아카이브에 대한 추출이 이미 진행 중.
    #[error("extraction already in progress: {}", path.display())]
    Busy { path: PathBuf },

    #[error("extraction cancelled: {}", path.display())]
    Cancelled { path: PathBuf },

    #[error("extraction failed for {}: {reason}", path.display())]
    ExtractFailed { path: PathBuf, reason: String },

    #[error("failed to list archive {}: {reason}", path.display())]
    ListFailed { path: PathBuf, reason: String },

    #[error("app listing unavailable: {reason}")]
    AppList { reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VtreeError>;
