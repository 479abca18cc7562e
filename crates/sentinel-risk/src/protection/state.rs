//! 세션 단위 보호 상태.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sentinel_core::{DecimalExt, Price};

/// 포지션별 부분 청산 단계 진행 상황.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialProgress {
    /// 부분 청산 완료
    pub closed: bool,
    /// 본전 손절 설정 완료
    pub breakeven: bool,
}

impl PartialProgress {
    pub fn is_complete(&self) -> bool {
        self.closed && self.breakeven
    }
}

/// 트레일링 적용 기록.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingRecord {
    /// 적용 시각
    pub applied_at: DateTime<Utc>,
    /// 적용한 손절 가격
    pub stop: Price,
}

/// 영속화되는 보호 상태 (세션/계좌당 하나).
///
/// `partial_close_done`과 `full_close_done`은 세션 안에서 단조 증가하며
/// 세션 리셋으로만 해제됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionState {
    /// 세션 기준 평가금액
    pub session_baseline_equity: Decimal,
    /// 이번 세션의 기준 평가금액이 설정되었는지
    pub baseline_set: bool,
    /// 부분 청산 단계 완료
    pub partial_close_done: bool,
    /// 부분 청산 단계 완료 시각
    pub partial_done_at: Option<DateTime<Utc>>,
    /// 전체 청산 단계 완료
    pub full_close_done: bool,
    /// 부분 청산 이후 새 거래가 열렸는지
    pub new_trade_since_partial: bool,
    /// 드로다운으로 신규 거래 차단 중
    pub drawdown_blocked: bool,
    /// 차단 사유
    pub block_reason: Option<String>,
    /// 트레일링 적용 기록 (position_id → 기록)
    pub trailing_applied: BTreeMap<String, TrailingRecord>,
    /// 부분 청산 진행 상황 (position_id → 진행)
    pub partial_progress: BTreeMap<String, PartialProgress>,
    /// 마지막 세션 리셋 시각
    pub last_reset_at: Option<DateTime<Utc>>,
}

impl ProtectionState {
    /// 기준 평가금액 대비 변동률 (%). 기준이 0 이하이면 0입니다.
    pub fn floating_pct(&self, equity: Decimal) -> f64 {
        let baseline = self.session_baseline_equity;
        if baseline <= Decimal::ZERO {
            return 0.0;
        }
        ((equity - baseline) / baseline * Decimal::ONE_HUNDRED).to_f64_lossy()
    }

    /// 현재 평가금액 기준으로 이미 초기 상태인지.
    pub fn is_pristine(&self, equity: Decimal) -> bool {
        self.baseline_set
            && self.session_baseline_equity == equity
            && !self.partial_close_done
            && !self.full_close_done
            && !self.new_trade_since_partial
            && !self.drawdown_blocked
            && self.trailing_applied.is_empty()
            && self.partial_progress.is_empty()
    }

    /// 세션 플래그를 모두 지우고 기준 평가금액을 다시 설정합니다.
    pub fn reset(&mut self, equity: Decimal, now: DateTime<Utc>) {
        *self = Self {
            session_baseline_equity: equity,
            baseline_set: true,
            last_reset_at: Some(now),
            ..Self::default()
        };
    }
}
