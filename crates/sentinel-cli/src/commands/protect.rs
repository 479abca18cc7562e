//! 보호 틱 드라이런 명령.
//!
//! JSON 브로커 스냅샷으로 모의 브로커를 만들고, 저장된 보호 상태로
//! 한 번의 보호 틱을 실행합니다. 브로커에 보낸 변경 요청과 틱 결과를
//! 돌려주고, 요청하면 변경이 반영된 스냅샷을 다시 씁니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use sentinel_core::{BrokerSnapshot, MutationRequest, PaperBroker};
use sentinel_risk::{JsonFileStore, ProtectionConfig, ProtectionManager, ProtectionStatus, TickReport};

/// 보호 틱 명령 설정.
#[derive(Debug, Clone)]
pub struct ProtectConfig {
    /// 브로커 스냅샷 JSON 파일
    pub snapshot_path: PathBuf,
    /// 보호 상태 JSON 파일
    pub state_path: PathBuf,
    /// 틱 시각 (없으면 현재 시각)
    pub at: Option<DateTime<Utc>>,
    /// 틱 전에 새 거래 진입을 알림
    pub new_trade: bool,
    /// 변경이 반영된 스냅샷을 쓸 경로
    pub write_snapshot: Option<PathBuf>,
}

/// 보호 틱 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectOutcome {
    pub report: TickReport,
    /// 브로커에 보낸 변경 요청 (순서대로)
    pub requests: Vec<MutationRequest>,
    pub status: ProtectionStatus,
}

/// 보호 틱을 한 번 실행합니다.
pub fn run_protect(config: &ProtectConfig, protection: &ProtectionConfig) -> Result<ProtectOutcome> {
    let snapshot = BrokerSnapshot::from_file(&config.snapshot_path).with_context(|| {
        format!(
            "Failed to load broker snapshot from {}",
            config.snapshot_path.display()
        )
    })?;
    let mut broker = PaperBroker::new(snapshot);

    let store = JsonFileStore::new(&config.state_path);
    let mut manager = ProtectionManager::new(protection.clone(), Box::new(store));
    if config.new_trade {
        manager.mark_new_trade_opened();
    }

    let now = config.at.unwrap_or_else(Utc::now);
    let report = manager
        .tick(&mut broker, now)
        .context("Protection tick failed")?;
    let requests = broker.take_requests();

    info!(
        actions = report.actions.len(),
        requests = requests.len(),
        blocked = report.trading_blocked,
        "Protection tick finished"
    );

    if let Some(path) = &config.write_snapshot {
        write_snapshot(path, broker.snapshot())?;
    }

    Ok(ProtectOutcome {
        report,
        requests,
        status: manager.status(),
    })
}

fn write_snapshot(path: &Path, snapshot: &BrokerSnapshot) -> Result<()> {
    let raw = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
    std::fs::write(path, raw)
        .with_context(|| format!("Failed to write snapshot to {}", path.display()))
}
