//! 보호 상태 조회와 수동 세션 리셋.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use sentinel_risk::{
    JsonFileStore, ProtectionConfig, ProtectionManager, ProtectionStatus, StateStore,
};

fn open_manager(state_path: &Path, protection: &ProtectionConfig) -> ProtectionManager {
    ProtectionManager::new(protection.clone(), Box::new(JsonFileStore::new(state_path)))
}

/// 저장된 보호 상태를 요약합니다.
pub fn show_status(state_path: &Path, protection: &ProtectionConfig) -> Result<ProtectionStatus> {
    if !state_path.exists() {
        info!(path = %state_path.display(), "No protection state yet");
    }
    Ok(open_manager(state_path, protection).status())
}

/// 운영자가 세션을 리셋합니다.
///
/// 모든 세션 플래그를 지우고 `equity`를 새 기준 평가금액으로 저장합니다.
pub fn reset_session(
    state_path: &Path,
    protection: &ProtectionConfig,
    equity: Decimal,
    at: Option<DateTime<Utc>>,
) -> Result<ProtectionStatus> {
    if equity <= Decimal::ZERO {
        anyhow::bail!("Baseline equity must be positive, got {}", equity);
    }
    let mut manager = open_manager(state_path, protection);
    manager.reset_session(equity, at.unwrap_or_else(Utc::now));

    // 저장 실패는 매니저가 로그만 남기므로 다시 읽어 확인
    let persisted = JsonFileStore::new(state_path)
        .load()
        .with_context(|| format!("Failed to read back {}", state_path.display()))?;
    if persisted.map(|s| s.session_baseline_equity) != Some(equity) {
        anyhow::bail!("Session reset was not persisted to {}", state_path.display());
    }
    Ok(manager.status())
}
