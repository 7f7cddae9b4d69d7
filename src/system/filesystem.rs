use crate::models::file_entry::{FileEntry, FileType};
use crate::utils::error::{Result, VtreeError};
use std::fs::{self, File, Metadata};
use std::path::Path;

/// 디렉토리 읽기
///
/// 주어진 경로의 디렉토리를 읽어서 파일 엔트리 리스트를 반환합니다.
/// 개별 엔트리의 메타데이터를 읽지 못하면 해당 엔트리는 스킵합니다.
pub fn read_directory(path: &Path) -> Result<Vec<FileEntry>> {
    if !path.exists() {
        return Err(VtreeError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(VtreeError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    let read_dir = fs::read_dir(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            VtreeError::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else {
            VtreeError::Io(e)
        }
    })?;

    let mut entries = Vec::new();
    for entry in read_dir {
        // 에러 발생 시 해당 엔트리는 스킵
        let Ok(entry) = entry else { continue };
        let entry_path = entry.path();
        let Ok(metadata) = fs::symlink_metadata(&entry_path) else {
            continue;
        };

        let name = entry.file_name().to_string_lossy().to_string();
        let file_type = file_type_of(&metadata);
        let size = if file_type == FileType::Directory {
            0
        } else {
            metadata.len()
        };
        let is_hidden = name.starts_with('.');

        entries.push(FileEntry {
            name,
            path: entry_path,
            file_type,
            size,
            is_hidden,
        });
    }

    Ok(entries)
}

fn file_type_of(metadata: &Metadata) -> FileType {
    if metadata.is_dir() {
        FileType::Directory
    } else if metadata.is_symlink() {
        FileType::Symlink
    } else {
        FileType::File
    }
}

/// 접근 가능 여부: 존재하고 실제로 열 수 있어야 한다.
///
/// Permissions can change between a check and the actual read, so callers
/// treat this as a hint, not a guarantee.
pub fn is_accessible(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Err(_) => false,
        Ok(metadata) => {
            if metadata.is_dir() {
                fs::read_dir(path).is_ok()
            } else {
                File::open(path).is_ok()
            }
        }
    }
}
