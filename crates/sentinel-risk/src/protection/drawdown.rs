//! 드로다운 차단 (히스테리시스).
//!
//! 변동률이 차단 기준 이하로 떨어지면 신규 거래를 막고, 더 높은 해제 기준
//! 이상으로 회복해야 풀어줍니다. 두 기준 사이에서는 현재 상태를 유지합니다.

use serde::{Deserialize, Serialize};

use crate::config::ProtectionConfig;

/// 한 번의 평가에서 일어난 상태 변화.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawdownTransition {
    /// 새로 차단됨
    Blocked,
    /// 차단 해제됨
    Unblocked,
    /// 변화 없음
    Unchanged,
}

/// 드로다운 차단기.
#[derive(Debug, Clone, Copy)]
pub struct DrawdownGuard {
    block_pct: f64,
    unblock_pct: f64,
}

impl DrawdownGuard {
    pub fn new(block_pct: f64, unblock_pct: f64) -> Self {
        Self {
            block_pct,
            unblock_pct,
        }
    }

    pub fn from_config(config: &ProtectionConfig) -> Self {
        Self::new(config.drawdown_block_pct, config.unblock_pct)
    }

    pub fn block_pct(&self) -> f64 {
        self.block_pct
    }

    pub fn unblock_pct(&self) -> f64 {
        self.unblock_pct
    }

    /// 현재 차단 여부와 변동률로 상태 변화를 판정합니다.
    pub fn evaluate(&self, blocked: bool, floating_pct: f64) -> DrawdownTransition {
        if !blocked && floating_pct <= self.block_pct {
            DrawdownTransition::Blocked
        } else if blocked && floating_pct >= self.unblock_pct {
            DrawdownTransition::Unblocked
        } else {
            DrawdownTransition::Unchanged
        }
    }

    /// 차단 사유 문자열.
    pub fn block_reason(&self, floating_pct: f64) -> String {
        format!(
            "floating equity {:.2}% at or below drawdown limit {:.2}%",
            floating_pct, self.block_pct
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hysteresis() {
        let guard = DrawdownGuard::new(-0.5, 0.0);

        assert_eq!(guard.evaluate(false, -0.6), DrawdownTransition::Blocked);
        assert_eq!(guard.evaluate(false, -0.4), DrawdownTransition::Unchanged);
        // 차단 중에는 해제 기준 전까지 유지
        assert_eq!(guard.evaluate(true, -0.2), DrawdownTransition::Unchanged);
        assert_eq!(guard.evaluate(true, 0.0), DrawdownTransition::Unblocked);
        assert_eq!(guard.evaluate(true, 0.1), DrawdownTransition::Unblocked);
    }

    #[test]
    fn test_block_reason() {
        let guard = DrawdownGuard::from_config(&ProtectionConfig::default());
        assert_eq!(
            guard.block_reason(-0.6),
            "floating equity -0.60% at or below drawdown limit -0.50%"
        );
    }
}
