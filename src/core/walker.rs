use crate::core::config::WalkerConfig;
use crate::models::node::{ExpandContext, VirtualNode};
use crate::system::archive::{self, ProgressEvent};
use crate::system::provider::{AppInfo, AppProvider, NoAppProvider};
use crate::utils::error::{Result, VtreeError};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{debug, warn};

/// 아카이브 식별자 하나당 슬롯 하나. 슬롯 뮤텍스가 같은 아카이브에 대한
/// 동시 추출을 직렬화하고, 값은 완료된 추출의 대상 디렉토리다.
type CacheSlot = Arc<Mutex<Option<PathBuf>>>;

/// 트리 전개의 조합 루트.
///
/// 노드에 능력 계약을 묻고, 아카이브 노드의 추출을 프로세스 수명 동안
/// 식별자당 최대 한 번으로 캐시한다. 캐시는 숨은 싱글턴이 아니라 명시적으로
/// 소유되는 객체라서 테스트마다 격리된 인스턴스를 만들 수 있다.
pub struct TreeWalker {
    config: WalkerConfig,
    apps: Arc<dyn AppProvider>,
    cache: Mutex<HashMap<PathBuf, CacheSlot>>,
    extractions: AtomicUsize,
}

/// 백그라운드 전개 핸들
pub struct ExpandTask {
    /// 진행률 이벤트 수신측
    pub progress: Receiver<ProgressEvent>,
    /// 완료 결과 수신측 (정확히 한 번 수신)
    pub result: Receiver<Result<Vec<VirtualNode>>>,
    /// 올리면 다음 엔트리 경계에서 작업이 중단된다
    pub cancel: Arc<AtomicBool>,
}

impl TreeWalker {
    pub fn new(config: WalkerConfig, apps: Arc<dyn AppProvider>) -> Self {
        Self {
            config,
            apps,
            cache: Mutex::new(HashMap::new()),
            extractions: AtomicUsize::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(WalkerConfig::load(), Arc::new(NoAppProvider))
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// 트리 진입점 노드.
    pub fn root(&self) -> VirtualNode {
        VirtualNode::root()
    }

    /// 동기 전개. 호출 스레드에서 추출까지 수행하므로 UI 스레드에서는
    /// [`TreeWalker::expand_in_background`]를 쓸 것.
    pub fn expand(
        &self,
        node: &VirtualNode,
        progress_tx: &Sender<ProgressEvent>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<VirtualNode>> {
        node.list_children(self, progress_tx, cancel)
    }

    /// 워커 스레드에서 전개하고 진행률/결과를 채널로 돌려준다.
    pub fn expand_in_background(self: &Arc<Self>, node: VirtualNode) -> ExpandTask {
        let (progress_tx, progress_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let walker = Arc::clone(self);
        let cancel_worker = Arc::clone(&cancel);
        std::thread::spawn(move || {
            let outcome = walker.expand(&node, &progress_tx, &cancel_worker);
            let _ = result_tx.send(outcome);
        });

        ExpandTask {
            progress: progress_rx,
            result: result_rx,
            cancel,
        }
    }

    /// 같은 아카이브를 추출 중인 다른 요청이 있으면 그 결과를 기다린다.
    pub fn ensure_extracted(
        &self,
        source: &Path,
        progress_tx: &Sender<ProgressEvent>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PathBuf> {
        let slot = self.slot(source);
        let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        self.extract_into_slot(source, guard, progress_tx, cancel)
    }

    /// 비대기 변형: 같은 식별자의 추출이 진행 중이면 [`VtreeError::Busy`].
    pub fn try_ensure_extracted(
        &self,
        source: &Path,
        progress_tx: &Sender<ProgressEvent>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PathBuf> {
        let slot = self.slot(source);
        let guard = match slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(VtreeError::Busy {
                    path: source.to_path_buf(),
                })
            }
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };
        self.extract_into_slot(source, guard, progress_tx, cancel)
    }

    /// 캐시 무효화: 원본 파일이 바뀐 경우 호출자가 명시적으로 부른다.
    pub fn invalidate(&self, source: &Path) {
        let removed = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.remove(source)
        };
        if let Some(slot) = removed {
            let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(dest) = guard.take() {
                if let Err(e) = fs::remove_dir_all(&dest) {
                    warn!(dest = %dest.display(), error = %e, "failed to drop extraction cache dir");
                }
            }
        }
    }

    /// 지금까지 실제로 수행된 추출 횟수.
    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    fn slot(&self, source: &Path) -> CacheSlot {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            cache
                .entry(source.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    fn extract_into_slot(
        &self,
        source: &Path,
        mut guard: MutexGuard<'_, Option<PathBuf>>,
        progress_tx: &Sender<ProgressEvent>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PathBuf> {
        if let Some(dest) = guard.as_ref() {
            if dest.is_dir() {
                debug!(source = %source.display(), dest = %dest.display(), "extraction cache hit");
                return Ok(dest.clone());
            }
            // 캐시는 있는데 디렉토리가 사라졌다면 다시 추출한다.
            *guard = None;
        }

        let dest = self.destination_for(source);
        // 이전 실행이 중단되어 남은 부분 결과는 통째로 무효.
        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }
        fs::create_dir_all(&dest)?;

        let summary = match archive::extract(source, &dest, progress_tx.clone(), Arc::clone(cancel))
        {
            Ok(summary) => summary,
            Err(e) => {
                let _ = fs::remove_dir_all(&dest);
                return Err(e);
            }
        };
        if summary.cancelled {
            let _ = fs::remove_dir_all(&dest);
            return Err(VtreeError::Cancelled {
                path: source.to_path_buf(),
            });
        }
        if summary.entries_skipped > 0 {
            warn!(
                source = %source.display(),
                skipped = summary.entries_skipped,
                "extraction completed with skipped entries"
            );
        }

        self.extractions.fetch_add(1, Ordering::SeqCst);
        debug!(
            source = %source.display(),
            dest = %dest.display(),
            entries = summary.entries_processed,
            "archive extracted"
        );
        *guard = Some(dest.clone());
        Ok(dest)
    }

    /// 대상 디렉토리는 원본 식별자에서 결정적으로 만든다. 파일 이름만으로는
    /// 서로 다른 경로의 동명 아카이브가 충돌하므로 경로 해시를 붙인다.
    fn destination_for(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_else(|| "archive".to_string());
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        self.config
            .cache_root
            .join(format!("{}-{:016x}", name, hasher.finish()))
    }
}

impl ExpandContext for TreeWalker {
    fn ensure_extracted(
        &self,
        source: &Path,
        progress_tx: &Sender<ProgressEvent>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PathBuf> {
        TreeWalker::ensure_extracted(self, source, progress_tx, cancel)
    }

    fn installed_apps(&self) -> Result<Vec<AppInfo>> {
        self.apps.installed_apps()
    }

    fn filesystem_root(&self) -> PathBuf {
        self.config.filesystem_root.clone()
    }

    fn external_storage_root(&self) -> PathBuf {
        self.config.external_storage_root.clone()
    }
}
