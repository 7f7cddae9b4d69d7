use std::path::PathBuf;

/// 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 디렉토리
    Directory,
    /// 일반 파일
    File,
    /// 심볼릭 링크
    Symlink,
}

/// 디렉토리 나열 결과의 한 항목
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// 파일/디렉토리 이름
    pub name: String,
    /// 전체 경로
    pub path: PathBuf,
    /// 파일 타입
    pub file_type: FileType,
    /// 바이트 단위 크기 (디렉토리는 0)
    pub size: u64,
    /// 숨김 파일 여부
    pub is_hidden: bool,
}

impl FileEntry {
    /// 디렉토리 여부 확인
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// 파일 여부 확인
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }
}
