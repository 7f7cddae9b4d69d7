use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// 장식용 아이콘에 대한 불투명 핸들. 코어는 내용을 해석하지 않는다.
pub type IconHandle = String;

/// 설치된 앱 하나에 대한 메타데이터
#[derive(Debug, Clone)]
pub struct AppInfo {
    /// 표시 이름
    pub label: String,
    /// 패키지 식별자
    pub package: String,
    /// 설치된 바이너리 경로
    pub path: PathBuf,
    /// 아이콘 (없을 수 있음)
    pub icon: Option<IconHandle>,
}

/// Platform app-listing collaborator. The core only needs stable iteration;
/// ordering is applied by the tree model itself.
pub trait AppProvider: Send + Sync {
    fn installed_apps(&self) -> Result<Vec<AppInfo>>;
}

/// 앱 목록을 제공하지 않는 플랫폼용 기본 구현.
pub struct NoAppProvider;

impl AppProvider for NoAppProvider {
    fn installed_apps(&self) -> Result<Vec<AppInfo>> {
        Ok(Vec::new())
    }
}

/// Platform permission/content collaborator: resolves an opaque content
/// reference to a filesystem path, or `None` when it cannot.
pub trait PathResolver: Send + Sync {
    fn resolve_path(&self, reference: &str) -> Option<PathBuf>;
}

/// 로컬 파일시스템만 아는 기본 리졸버: 존재하는 절대 경로만 통과시킨다.
pub struct LocalResolver;

impl PathResolver for LocalResolver {
    fn resolve_path(&self, reference: &str) -> Option<PathBuf> {
        let path = Path::new(reference);
        if path.is_absolute() && path.exists() {
            Some(path.to_path_buf())
        } else {
            None
        }
    }
}
