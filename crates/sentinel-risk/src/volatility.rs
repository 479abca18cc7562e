//! 적응형 변동성 분류.
//!
//! ATR 시계열에서 현재 값의 백분위 순위를 계산하여 저/중/고 변동성 구간을
//! 판정하고, 구간별 손절 배수를 반환합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use sentinel_core::{Candle, DecimalExt};

use crate::config::VolatilityConfig;
use crate::indicators::atr_series;

/// 백분위 계산에 필요한 최소 표본 수.
pub const MIN_VOLATILITY_SAMPLES: usize = 30;

/// 변동성 구간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Low,
    Mid,
    High,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Low => write!(f, "LOW"),
            Regime::Mid => write!(f, "MID"),
            Regime::High => write!(f, "HIGH"),
        }
    }
}

/// 분류 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityRegime {
    /// 현재 ATR 값 (계산 불가 시 0)
    pub current_true_range: Decimal,
    /// 최근 구간 내 백분위 순위 (0~1)
    pub percentile_rank: f64,
    /// 변동성 구간
    pub regime: Regime,
    /// 적용 배수
    pub multiplier: f64,
    /// 중간 배수로 대체된 이유
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl VolatilityRegime {
    /// 대체 경로로 결정되었는지.
    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// 변동성 분류기.
#[derive(Debug, Clone)]
pub struct VolatilityClassifier {
    config: VolatilityConfig,
    atr_period: usize,
}

impl VolatilityClassifier {
    pub fn new(config: VolatilityConfig, atr_period: usize) -> Self {
        Self {
            config,
            atr_period: atr_period.max(1),
        }
    }

    /// 구간별 배수.
    pub fn multiplier_for(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Low => self.config.low_multiplier,
            Regime::Mid => self.config.mid_multiplier,
            Regime::High => self.config.high_multiplier,
        }
    }

    /// 캔들 구간의 현재 변동성을 분류합니다.
    pub fn classify(&self, candles: &[Candle]) -> VolatilityRegime {
        let series: Vec<Decimal> = atr_series(candles, self.atr_period)
            .into_iter()
            .flatten()
            .collect();
        let current = series.last().copied().unwrap_or(Decimal::ZERO);

        if !self.config.adaptive {
            return self.fallback(current, "adaptive volatility disabled".to_string());
        }

        let required = MIN_VOLATILITY_SAMPLES.max(self.config.lookback / 3);
        if series.len() < required {
            return self.fallback(
                current,
                format!(
                    "insufficient ATR samples ({} < {})",
                    series.len(),
                    required
                ),
            );
        }

        let start = series.len().saturating_sub(self.config.lookback.max(1));
        let window = &series[start..];
        if window.iter().all(|v| *v == window[0]) {
            return self.fallback(current, "zero ATR variance".to_string());
        }

        let at_or_below = window.iter().filter(|v| **v <= current).count();
        let rank = at_or_below as f64 / window.len() as f64;

        let regime = if rank <= self.config.low_percentile {
            Regime::Low
        } else if rank >= self.config.high_percentile {
            Regime::High
        } else {
            Regime::Mid
        };

        tracing::debug!(
            atr = current.to_f64_lossy(),
            rank = rank,
            regime = %regime,
            "Volatility regime classified"
        );

        VolatilityRegime {
            current_true_range: current,
            percentile_rank: rank,
            regime,
            multiplier: self.multiplier_for(regime),
            fallback_reason: None,
        }
    }

    fn fallback(&self, current: Decimal, reason: String) -> VolatilityRegime {
        tracing::info!(reason = %reason, "Volatility classification fell back to MID");
        VolatilityRegime {
            current_true_range: current,
            percentile_rank: 0.5,
            regime: Regime::Mid,
            multiplier: self.config.mid_multiplier,
            fallback_reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    /// `range_pips(i)` 폭을 갖는 캔들 시계열.
    fn candles_with_range(len: usize, range_pips: impl Fn(usize) -> i64) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        (0..len)
            .map(|i| {
                let half = Decimal::new(range_pips(i), 4) / Decimal::TWO;
                Candle::new(
                    t0 + Duration::minutes(15 * i as i64),
                    dec!(1.2000),
                    dec!(1.2000) + half,
                    dec!(1.2000) - half,
                    dec!(1.2000),
                    Decimal::ZERO,
                )
            })
            .collect()
    }

    fn classifier() -> VolatilityClassifier {
        VolatilityClassifier::new(VolatilityConfig::default(), 14)
    }

    #[test]
    fn test_rising_volatility_is_high() {
        let candles = candles_with_range(100, |i| 10 + i as i64);
        let result = classifier().classify(&candles);

        assert_eq!(result.regime, Regime::High);
        assert_eq!(result.percentile_rank, 1.0);
        assert_eq!(result.multiplier, 1.8);
        assert!(!result.is_fallback());
    }

    #[test]
    fn test_falling_volatility_is_low() {
        let candles = candles_with_range(100, |i| 200 - i as i64);
        let result = classifier().classify(&candles);

        assert_eq!(result.regime, Regime::Low);
        assert!(result.percentile_rank < 0.3);
        assert_eq!(result.multiplier, 1.2);
    }

    #[test]
    fn test_short_series_falls_back_to_mid() {
        // ATR 값이 30개 미만
        let candles = candles_with_range(40, |i| 10 + i as i64);
        let result = classifier().classify(&candles);

        assert_eq!(result.regime, Regime::Mid);
        assert_eq!(result.multiplier, 1.5);
        assert!(result.fallback_reason.unwrap().contains("insufficient"));
    }

    #[test]
    fn test_zero_variance_falls_back_to_mid() {
        let candles = candles_with_range(100, |_| 20);
        let result = classifier().classify(&candles);

        assert_eq!(result.regime, Regime::Mid);
        assert_eq!(result.current_true_range, dec!(0.0020));
        assert!(result.is_fallback());
    }

    #[test]
    fn test_non_adaptive_uses_mid_multiplier() {
        let config = VolatilityConfig {
            adaptive: false,
            mid_multiplier: 1.6,
            ..Default::default()
        };
        let candles = candles_with_range(100, |i| 10 + i as i64);
        let result = VolatilityClassifier::new(config, 14).classify(&candles);

        assert_eq!(result.regime, Regime::Mid);
        assert_eq!(result.multiplier, 1.6);
    }
}
