use crate::utils::error::{Result, VtreeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// 탐색 루트와 추출 캐시 위치 설정
///
/// TOML 파일에서 로드하거나 기본값을 사용할 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// 파일시스템 루트
    pub filesystem_root: PathBuf,
    /// 외부 저장소 루트
    pub external_storage_root: PathBuf,
    /// 추출된 아카이브가 쌓이는 스크래치 영역
    pub cache_root: PathBuf,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let cache = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("vtree")
            .join("extracted");
        Self {
            filesystem_root: PathBuf::from("/"),
            external_storage_root: home,
            cache_root: cache,
        }
    }
}

impl WalkerConfig {
    /// 설정 파일 로드: `<config_dir>/vtree/config.toml`, 없으면 기본값.
    pub fn load() -> Self {
        let Some(config_dir) = dirs::config_dir() else {
            return Self::default();
        };
        let path = config_dir.join("vtree").join("config.toml");
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config load failed, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| VtreeError::Config(e.to_string()))
    }
}
