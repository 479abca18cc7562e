//! 리스크 단계의 에러 타입.

use sentinel_core::BrokerError;
use thiserror::Error;

use crate::config::ConfigValidationError;
use crate::protection::StoreError;

/// 리스크 단계 에러.
///
/// `InsufficientData`와 `InvalidGeometry`는 계산기 내부에서 대체 경로로 복구되며,
/// 호출자에게 도달하는 것은 최종 검증에 실패한 경우뿐입니다.
/// `RiskRewardUnmet`은 거래 거부(veto)이므로 절대 무시하면 안 됩니다.
#[derive(Debug, Error)]
pub enum RiskError {
    /// 캔들 데이터 부족
    #[error("데이터가 부족합니다: 필요 {required}개, 제공 {provided}개")]
    InsufficientData { required: usize, provided: usize },

    /// 손절/목표가 진입가의 잘못된 쪽에 있음
    #[error("잘못된 손절/목표 배치: {0}")]
    InvalidGeometry(String),

    /// 보정 후에도 최소 손익비 미달 (거래 거부)
    #[error("손익비 미달로 거래 거부: {ratio:.2} < {minimum:.2} ({reason})")]
    RiskRewardUnmet {
        ratio: f64,
        minimum: f64,
        reason: String,
    },

    /// 브로커 호출 실패
    #[error("브로커 에러: {0}")]
    Broker(#[from] BrokerError),

    /// 상태 저장소 실패
    #[error("상태 저장소 에러: {0}")]
    Persistence(#[from] StoreError),

    /// 설정 검증 실패
    #[error("설정 에러: {0}")]
    Config(#[from] ConfigValidationError),
}

/// 리스크 작업을 위한 Result 타입.
pub type RiskResult<T> = Result<T, RiskError>;

impl RiskError {
    /// 거래를 진행하면 안 되는 거부 사유인지 확인합니다.
    pub fn is_veto(&self) -> bool {
        matches!(
            self,
            RiskError::RiskRewardUnmet { .. } | RiskError::InvalidGeometry(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_veto_classification() {
        let unmet = RiskError::RiskRewardUnmet {
            ratio: 1.25,
            minimum: 1.5,
            reason: "forced target exceeds 500 pips".to_string(),
        };
        assert!(unmet.is_veto());
        assert_eq!(
            unmet.to_string(),
            "손익비 미달로 거래 거부: 1.25 < 1.50 (forced target exceeds 500 pips)"
        );

        let broker = RiskError::from(BrokerError::Unavailable("timeout".to_string()));
        assert!(!broker.is_veto());
    }
}
