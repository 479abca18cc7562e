//! 보유 시간 기반 트레일링 손절.
//!
//! 수익 중인 포지션이 일정 시간 이상 유지되면 현재가에서 ATR 배수 또는
//! 고정 pip 만큼 떨어진 곳으로 손절을 끌어올립니다. 손절은 절대 느슨해지지
//! 않습니다.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{BrokerGateway, DecimalExt, Position, Price, SymbolSpec};

use crate::config::TrailingConfig;
use crate::error::RiskResult;
use crate::indicators::latest_atr;

/// 트레일링 거리 모드.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrailingMode {
    /// ATR 기반 동적 거리
    AtrBased {
        /// ATR 배수
        multiplier: f64,
    },
    /// 고정 pip 거리
    FixedPips {
        /// pip 수
        pips: Decimal,
    },
}

impl TrailingMode {
    pub fn from_config(config: &TrailingConfig) -> Self {
        if config.use_atr {
            TrailingMode::AtrBased {
                multiplier: config.atr_multiplier,
            }
        } else {
            TrailingMode::FixedPips {
                pips: config.fixed_pips,
            }
        }
    }
}

/// 트레일링 손절 계산기.
#[derive(Debug, Clone)]
pub struct TrailingStopPlanner {
    config: TrailingConfig,
    mode: TrailingMode,
}

impl TrailingStopPlanner {
    pub fn new(config: TrailingConfig) -> Self {
        let mode = TrailingMode::from_config(&config);
        Self { config, mode }
    }

    pub fn mode(&self) -> TrailingMode {
        self.mode
    }

    /// 수익 중이고 대기 시간이 지났는지.
    pub fn is_due(&self, position: &Position, now: DateTime<Utc>) -> bool {
        position.is_profitable()
            && position.age(now) >= Duration::seconds(self.config.activate_after_secs)
    }

    /// 트레일링 거리 (가격 단위).
    ///
    /// ATR 모드에서 캔들 조회나 ATR 계산이 실패하면 에러를 반환합니다.
    pub fn distance(
        &self,
        broker: &dyn BrokerGateway,
        position: &Position,
        spec: &SymbolSpec,
    ) -> RiskResult<Decimal> {
        match self.mode {
            TrailingMode::AtrBased { multiplier } => {
                let candles = broker.candles(
                    &position.symbol,
                    self.config.timeframe,
                    self.config.atr_period + 1,
                )?;
                let atr = latest_atr(&candles, self.config.atr_period)?;
                Ok(atr.mul_f64(multiplier))
            }
            TrailingMode::FixedPips { pips } => Ok(spec.pips_to_price(pips)),
        }
    }

    /// 현재가 기준 새 손절. 현재 손절보다 조이지 않으면 `None`입니다.
    ///
    /// 손절은 현재가에서 멀어지는 쪽으로 호가 단위에 맞춥니다.
    pub fn proposed_stop(
        &self,
        position: &Position,
        distance: Decimal,
        spec: &SymbolSpec,
    ) -> Option<Price> {
        if distance <= Decimal::ZERO {
            return None;
        }
        let candidate = spec.round_away_from(
            position.side.stop_from(position.current_price, distance),
            position.current_price,
        );
        match position.stop_loss {
            Some(current) if !position.side.is_tighter_stop(candidate, current) => None,
            _ => Some(candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use sentinel_core::{Candle, PaperBroker, Side};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 6, 10, 0, 0).unwrap()
    }

    fn position(opened_minutes_ago: i64) -> Position {
        Position::new(
            "1001",
            "EURUSD",
            Side::Buy,
            dec!(1.0),
            dec!(1.2000),
            now() - Duration::minutes(opened_minutes_ago),
        )
        .with_market(dec!(1.2050), dec!(500))
        .with_stop_loss(dec!(1.1950))
    }

    #[test]
    fn test_dwell_period() {
        let planner = TrailingStopPlanner::new(TrailingConfig::default());
        assert!(!planner.is_due(&position(20), now()));
        assert!(planner.is_due(&position(30), now()));

        let losing = position(60).with_market(dec!(1.1990), dec!(-100));
        assert!(!planner.is_due(&losing, now()));
    }

    #[test]
    fn test_fixed_distance_never_loosens() {
        let config = TrailingConfig {
            use_atr: false,
            ..Default::default()
        };
        let planner = TrailingStopPlanner::new(config);
        let broker = PaperBroker::with_equity(dec!(10000));
        let spec = SymbolSpec::forex("EURUSD");
        let pos = position(60);

        let distance = planner.distance(&broker, &pos, &spec).unwrap();
        assert_eq!(distance, dec!(0.0020));
        assert_eq!(planner.proposed_stop(&pos, distance, &spec), Some(dec!(1.2030)));

        // 이미 더 조인 손절이 있으면 제안하지 않음
        let tight = pos.clone().with_stop_loss(dec!(1.2040));
        assert_eq!(planner.proposed_stop(&tight, distance, &spec), None);
    }

    #[test]
    fn test_proposed_stop_is_tick_aligned() {
        let planner = TrailingStopPlanner::new(TrailingConfig::default());
        let spec = SymbolSpec::forex("EURUSD");
        let sell = Position::new("2002", "EURUSD", Side::Sell, dec!(1.0), dec!(1.2100), now())
            .with_market(dec!(1.2050), dec!(500));

        // ATR 기반 거리는 호가 단위에 맞지 않을 수 있음
        let stop = planner
            .proposed_stop(&sell, dec!(0.00213333), &spec)
            .unwrap();
        assert_eq!(stop, dec!(1.20714));

        let stop = planner
            .proposed_stop(&position(60), dec!(0.00213333), &spec)
            .unwrap();
        assert_eq!(stop, dec!(1.20286));
    }

    #[test]
    fn test_atr_distance_from_broker_candles() {
        let planner = TrailingStopPlanner::new(TrailingConfig::default());
        let mut broker = PaperBroker::with_equity(dec!(10000));
        let spec = SymbolSpec::forex("EURUSD");
        let pos = position(60);

        // 캔들이 없으면 ATR 계산 실패
        assert!(planner.distance(&broker, &pos, &spec).is_err());

        let t0 = now() - Duration::hours(10);
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                Candle::new(
                    t0 + Duration::minutes(15 * i),
                    dec!(1.2000),
                    dec!(1.2010),
                    dec!(1.1990),
                    dec!(1.2000),
                    Decimal::ZERO,
                )
            })
            .collect();
        broker.set_candles("EURUSD", candles);

        // ATR 0.0020 × 1.5
        let distance = planner.distance(&broker, &pos, &spec).unwrap();
        assert_eq!(distance, dec!(0.0030));
        assert_eq!(planner.proposed_stop(&pos, distance, &spec), Some(dec!(1.2020)));
    }
}
