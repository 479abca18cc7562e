//! 2단계 목표(TP) 분할.
//!
//! 1차 목표에서 일부를, 2차 목표에서 나머지를 청산하도록 손익비 기준
//! 목표 가격과 비중을 계산합니다.

use serde::{Deserialize, Serialize};

use sentinel_core::{DecimalExt, Price, Side, SymbolSpec};

use crate::config::{ConfigValidationError, TpSplitConfig};

/// 손절 거리의 `ratio` 배만큼 진입가 앞의 가격.
pub fn price_at_ratio(entry: Price, stop: Price, ratio: f64, side: Side) -> Price {
    let risk = side.risk_distance(entry, stop).abs();
    side.target_from(entry, risk.mul_f64(ratio))
}

/// 분할 목표 하나.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpLeg {
    /// 손익비
    pub ratio: f64,
    /// 청산 비중 (0~1)
    pub size: f64,
    /// 목표 가격
    pub price: Price,
}

/// 분할 계획.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpSplitPlan {
    pub tp1: TpLeg,
    pub tp2: TpLeg,
}

impl TpSplitPlan {
    /// 두 목표를 진입가에서 멀어지는 쪽으로 호가 단위에 맞춥니다.
    pub fn aligned_to_tick(mut self, spec: &SymbolSpec, entry: Price) -> Self {
        self.tp1.price = spec.round_away_from(self.tp1.price, entry);
        self.tp2.price = spec.round_away_from(self.tp2.price, entry);
        self
    }

    /// 요약 문자열 (로그/CLI 출력용).
    pub fn summary(&self) -> String {
        format!(
            "TP1={} ({}:1, {:.0}%) | TP2={} ({}:1, {:.0}%)",
            self.tp1.price,
            self.tp1.ratio,
            self.tp1.size * 100.0,
            self.tp2.price,
            self.tp2.ratio,
            self.tp2.size * 100.0
        )
    }
}

/// TP 분할 계획기.
#[derive(Debug, Clone)]
pub struct TpSplitPlanner {
    config: TpSplitConfig,
}

impl TpSplitPlanner {
    pub fn new(config: TpSplitConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// 분할 설정을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let c = &self.config;
        if c.tp1_ratio <= 0.0 || c.tp2_ratio <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "tp split ratios must be greater than 0".into(),
            ));
        }
        if c.tp1_ratio >= c.tp2_ratio {
            return Err(ConfigValidationError::InvalidValue(
                "tp2_ratio must be greater than tp1_ratio".into(),
            ));
        }
        if (c.tp1_size + c.tp2_size - 1.0).abs() > 1e-9 {
            return Err(ConfigValidationError::InvalidValue(
                "tp split sizes must sum to 1".into(),
            ));
        }
        Ok(())
    }

    /// 분할이 켜져 있으면 계획을 반환합니다.
    pub fn plan(&self, side: Side, entry: Price, stop: Price) -> Option<TpSplitPlan> {
        if !self.config.enabled {
            return None;
        }

        let c = &self.config;
        let plan = TpSplitPlan {
            tp1: TpLeg {
                ratio: c.tp1_ratio,
                size: c.tp1_size,
                price: price_at_ratio(entry, stop, c.tp1_ratio, side),
            },
            tp2: TpLeg {
                ratio: c.tp2_ratio,
                size: c.tp2_size,
                price: price_at_ratio(entry, stop, c.tp2_ratio, side),
            },
        };

        tracing::debug!(side = %side, plan = %plan.summary(), "TP split planned");
        Some(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_at_ratio() {
        assert_eq!(
            price_at_ratio(dec!(1.2000), dec!(1.1950), 2.0, Side::Buy),
            dec!(1.2100)
        );
        assert_eq!(
            price_at_ratio(dec!(1.2000), dec!(1.2050), 1.0, Side::Sell),
            dec!(1.1950)
        );
    }

    #[test]
    fn test_plan_disabled_by_default() {
        let planner = TpSplitPlanner::new(TpSplitConfig::default());
        assert!(planner.plan(Side::Buy, dec!(1.2000), dec!(1.1950)).is_none());
        assert!(planner.validate().is_ok());
    }

    #[test]
    fn test_plan_legs() {
        let planner = TpSplitPlanner::new(TpSplitConfig {
            enabled: true,
            ..Default::default()
        });
        let plan = planner.plan(Side::Sell, dec!(150.00), dec!(150.50)).unwrap();

        assert_eq!(plan.tp1.price, dec!(149.50));
        assert_eq!(plan.tp2.price, dec!(149.00));
        assert_eq!(plan.tp1.size, 0.3);
        assert!(plan.summary().contains("TP2=149"));
    }

    #[test]
    fn test_legs_aligned_to_tick() {
        let planner = TpSplitPlanner::new(TpSplitConfig {
            enabled: true,
            ..Default::default()
        });
        let spec = SymbolSpec::forex("EURUSD");
        let plan = planner
            .plan(Side::Buy, dec!(1.2000), dec!(1.1966667))
            .unwrap()
            .aligned_to_tick(&spec, dec!(1.2000));

        assert!(spec.is_on_tick(plan.tp1.price));
        assert!(spec.is_on_tick(plan.tp2.price));
        assert!(plan.tp1.price > dec!(1.2000) && plan.tp2.price > plan.tp1.price);
    }

    #[test]
    fn test_invalid_split_config() {
        let planner = TpSplitPlanner::new(TpSplitConfig {
            tp1_ratio: 2.0,
            tp2_ratio: 1.0,
            ..Default::default()
        });
        assert!(planner.validate().is_err());

        let planner = TpSplitPlanner::new(TpSplitConfig {
            tp1_size: 0.5,
            ..Default::default()
        });
        assert!(planner.validate().is_err());
    }
}
