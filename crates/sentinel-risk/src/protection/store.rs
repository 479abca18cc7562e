//! 보호 상태 저장소.
//!
//! 상태는 JSON 문서 하나로 저장됩니다. 파일 저장소는 같은 디렉토리에 임시
//! 파일을 쓴 뒤 rename하여 원자적으로 교체합니다.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::state::ProtectionState;

/// 상태 저장소 에러.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 파일 입출력 실패
    #[error("상태 파일 입출력 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 저장된 문서를 해석할 수 없음
    #[error("상태 문서 손상: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// 보호 상태 저장소 trait.
pub trait StateStore {
    /// 저장된 상태. 아직 저장된 적이 없으면 `None`입니다.
    fn load(&self) -> Result<Option<ProtectionState>, StoreError>;

    /// 상태를 통째로 저장합니다.
    fn save(&self, state: &ProtectionState) -> Result<(), StoreError>;

    /// 로깅용 설명.
    fn describe(&self) -> String {
        "state store".to_string()
    }
}

/// JSON 파일 저장소.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<ProtectionState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, state: &ProtectionState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io(e)
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

/// 메모리 저장소. 복제본끼리 같은 상태를 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: Option<ProtectionState>,
    fail_saves: bool,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 상태를 가진 저장소.
    pub fn with_state(state: ProtectionState) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.state = Some(state);
        }
        store
    }

    /// 저장 실패를 흉내냅니다.
    pub fn set_fail_saves(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_saves = fail;
        }
    }

    /// 마지막으로 저장된 상태.
    pub fn saved(&self) -> Option<ProtectionState> {
        self.inner.lock().ok().and_then(|inner| inner.state.clone())
    }

    /// 성공한 저장 횟수.
    pub fn save_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.saves).unwrap_or(0)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<ProtectionState>, StoreError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".to_string()))?;
        Ok(inner.state.clone())
    }

    fn save(&self, state: &ProtectionState) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".to_string()))?;
        if inner.fail_saves {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated save failure",
            )));
        }
        inner.state = Some(state.clone());
        inner.saves += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_state() -> ProtectionState {
        ProtectionState {
            session_baseline_equity: dec!(10000),
            baseline_set: true,
            partial_close_done: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));

        assert!(store.load().unwrap().is_none());
        store.save(&sample_state()).unwrap();

        assert_eq!(store.load().unwrap(), Some(sample_state()));
        // 임시 파일이 남지 않음
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_json_store_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_memory_store_shared_between_clones() {
        let store = MemoryStore::new();
        let observer = store.clone();

        store.save(&sample_state()).unwrap();
        assert_eq!(observer.saved(), Some(sample_state()));
        assert_eq!(observer.save_count(), 1);

        store.set_fail_saves(true);
        assert!(store.save(&ProtectionState::default()).is_err());
        assert_eq!(observer.saved(), Some(sample_state()));
    }
}
