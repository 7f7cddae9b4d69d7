use crate::system::archive::ProgressEvent;
use crate::system::filesystem;
use crate::system::provider::{AppInfo, IconHandle};
use crate::system::sniffer::{self, FileKind};
use crate::utils::error::{Result, VtreeError};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::warn;

/// 노드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// 실제 파일시스템 항목 (파일, 디렉토리, 아카이브)
    Filesystem,
    /// 설치된 앱 컬렉션 (합성)
    Apps,
    /// 실행 중인 프로세스 컬렉션 (합성, 스텁)
    Processes,
    /// 트리의 단일 진입점 (합성)
    Root,
    /// 전개 불가능한 표시용 항목
    Placeholder,
}

/// The seam the composition root implements so nodes stay free of cache and
/// configuration concerns.
pub trait ExpandContext {
    /// Extracts `source` once per identity and returns the cached
    /// destination directory.
    fn ensure_extracted(
        &self,
        source: &Path,
        progress_tx: &Sender<ProgressEvent>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PathBuf>;

    fn installed_apps(&self) -> Result<Vec<AppInfo>>;

    fn filesystem_root(&self) -> PathBuf;

    fn external_storage_root(&self) -> PathBuf;
}

/// 가상 트리 노드
///
/// 파일시스템 항목, 아카이브 내용, 합성 컬렉션을 하나의 능력 계약
/// (`is_expandable` / `is_accessible` / `list_children`) 뒤로 통일한다.
/// 전개 가능/접근 가능 플래그는 저장하지 않고 호출 시마다 계산한다
/// (생성 시점 캐시는 권한 변경을 놓친다).
#[derive(Debug, Clone)]
pub struct VirtualNode {
    /// 표시 이름
    pub label: String,
    /// 노드 종류
    pub kind: NodeKind,
    /// 장식용 아이콘 (의미 없음)
    pub icon: Option<IconHandle>,
    // 배킹 경로는 생성 후 불변.
    path: Option<PathBuf>,
}

impl VirtualNode {
    /// 트리의 단일 진입점.
    pub fn root() -> Self {
        Self::synthetic("Main", NodeKind::Root)
    }

    pub fn apps() -> Self {
        Self::synthetic("Apps", NodeKind::Apps)
    }

    pub fn processes() -> Self {
        Self::synthetic("Processes", NodeKind::Processes)
    }

    pub fn placeholder(label: impl Into<String>) -> Self {
        Self::synthetic(label, NodeKind::Placeholder)
    }

    fn synthetic(label: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            label: label.into(),
            kind,
            icon: None,
            path: None,
        }
    }

    /// 파일 이름을 표시 이름으로 쓰는 파일시스템 노드.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self::with_label(label, path)
    }

    pub fn with_label(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            kind: NodeKind::Filesystem,
            icon: None,
            path: Some(path.into()),
        }
    }

    fn app_entry(info: AppInfo) -> Self {
        Self {
            label: format!("{} ({})", info.label, info.package),
            kind: NodeKind::Filesystem,
            icon: info.icon,
            path: Some(info.path),
        }
    }

    pub fn backing_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 전개 가능 여부.
    ///
    /// 파일시스템 노드는 디렉토리이거나, 아카이브 또는 관리 코드 모듈로
    /// 분류될 때 전개 가능하다. 네이티브 실행 모듈은 여기서 전개할 방법이
    /// 없으므로 분류만 하고 전개 대상에서 제외한다.
    pub fn is_expandable(&self) -> bool {
        match self.kind {
            NodeKind::Root | NodeKind::Apps | NodeKind::Processes => true,
            NodeKind::Placeholder => false,
            NodeKind::Filesystem => match &self.path {
                Some(path) => {
                    path.is_dir()
                        || matches!(
                            sniffer::classify(path),
                            FileKind::Archive(_) | FileKind::Managed
                        )
                }
                None => false,
            },
        }
    }

    /// 접근 가능 여부. 합성 노드는 항상 접근 가능.
    pub fn is_accessible(&self) -> bool {
        match self.kind {
            NodeKind::Filesystem => self
                .path
                .as_deref()
                .is_some_and(filesystem::is_accessible),
            _ => true,
        }
    }

    pub fn can_expand(&self) -> bool {
        self.is_expandable() && self.is_accessible()
    }

    /// Produces this node's children.
    ///
    /// Defensive by contract: a non-expandable or inaccessible node yields an
    /// empty list, and data-quality failures (a directory deleted between the
    /// capability check and the read, a corrupt archive body) degrade to
    /// empty plus a diagnostic. Only traversal violations, busy and cancelled
    /// extractions propagate, since the caller must act on those.
    pub fn list_children(
        &self,
        ctx: &dyn ExpandContext,
        progress_tx: &Sender<ProgressEvent>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<VirtualNode>> {
        if !self.can_expand() {
            return Ok(Vec::new());
        }

        match self.kind {
            NodeKind::Root => Ok(vec![
                VirtualNode::from_path(ctx.filesystem_root()),
                VirtualNode::with_label("External storage", ctx.external_storage_root()),
                VirtualNode::apps(),
                VirtualNode::processes(),
            ]),
            NodeKind::Apps => Ok(self.list_apps(ctx, progress_tx)),
            NodeKind::Processes => Ok(vec![VirtualNode::placeholder("Currently unavailable")]),
            NodeKind::Placeholder => Ok(Vec::new()),
            NodeKind::Filesystem => {
                let Some(path) = self.path.as_deref() else {
                    return Ok(Vec::new());
                };
                if path.is_dir() {
                    return Ok(Self::list_directory(path));
                }
                if matches!(sniffer::classify(path), FileKind::Archive(_)) {
                    let dest = match ctx.ensure_extracted(path, progress_tx, cancel) {
                        Ok(dest) => dest,
                        Err(
                            e @ (VtreeError::Traversal { .. }
                            | VtreeError::Busy { .. }
                            | VtreeError::Cancelled { .. }),
                        ) => return Err(e),
                        // 손상된 아카이브는 권한 없는 디렉토리와 같은 급의
                        // 데이터 품질 문제: 빈 목록으로 낮춘다.
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "archive expansion failed");
                            return Ok(Vec::new());
                        }
                    };
                    return Ok(Self::list_directory(&dest));
                }
                // 관리 코드 모듈: 전개는 가능하다고 보고되지만 내용 검사는
                // 외부 협력자의 몫이므로 자식은 없다.
                Ok(Vec::new())
            }
        }
    }

    fn list_directory(path: &Path) -> Vec<VirtualNode> {
        match filesystem::read_directory(path) {
            Ok(entries) => entries
                .into_iter()
                .map(|e| VirtualNode::with_label(e.name, e.path))
                .collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "directory listing failed");
                Vec::new()
            }
        }
    }

    /// 앱 컬렉션 전개: 표시 이름으로 정렬 후 앱마다 자식 노드 하나.
    ///
    /// 진행률은 두 단계로 보고한다. 정렬 단계가 전체 항목 한 번 순회,
    /// 열거 단계가 또 한 번 순회에 해당하므로 전체 작업량은 `2 * n`이고
    /// 관찰자는 두 단계에 걸쳐 단조 증가하는 진행률을 본다.
    fn list_apps(
        &self,
        ctx: &dyn ExpandContext,
        progress_tx: &Sender<ProgressEvent>,
    ) -> Vec<VirtualNode> {
        let mut apps = match ctx.installed_apps() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "app listing failed");
                return Vec::new();
            }
        };

        let count = apps.len() as u64;
        let total = count * 2;
        send_count(progress_tx, total, 0);

        apps.sort_by(|a, b| a.label.cmp(&b.label));
        send_count(progress_tx, total, count);

        let mut children = Vec::with_capacity(apps.len());
        for (i, info) in apps.into_iter().enumerate() {
            children.push(VirtualNode::app_entry(info));
            if (i + 1) % 10 == 0 {
                send_count(progress_tx, total, count + i as u64 + 1);
            }
        }
        send_count(progress_tx, total, total);
        children
    }
}

fn send_count(progress_tx: &Sender<ProgressEvent>, total: u64, processed: u64) {
    let _ = progress_tx.send(ProgressEvent {
        total_bytes: total,
        processed_bytes: processed,
        entry: String::new(),
    });
}
