//! 거래 제안 평가 파이프라인.
//!
//! 손절/목표 계산 → 브로커 최소 거리 → 손익비 검증/보정 → 배치 검증 →
//! (선택) TP 분할 순서로 진행하여 거래 계획 또는 거부 사유를 반환합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{evaluation_span, Price, Side};

use crate::config::RiskConfig;
use crate::error::RiskResult;
use crate::levels::{enforce_broker_min_stops, validate_levels};
use crate::rrr::{reward_risk_ratio, RepairRequest, RepairStep, RiskRewardValidator};
use crate::stop_target::{mark_adjustment_overridden, StopTargetCalculator, StopTargetRequest};
use crate::tp_split::{TpSplitPlan, TpSplitPlanner};
use crate::volatility::VolatilityRegime;

const BROKER_MINIMUM_SOURCE: &str = "broker minimum distance (+2 ticks)";

/// 승인된 거래 계획.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: String,
    pub side: Side,
    pub entry_price: Price,
    pub stop_price: Price,
    pub target_price: Price,
    pub reward_risk_ratio: f64,
    pub stop_source: String,
    pub target_source: String,
    pub session_adjustment: String,
    pub volatility_used: VolatilityRegime,
    pub atr: Decimal,
    /// 적용된 손익비 보정 단계
    pub repairs: Vec<RepairStep>,
    /// 브로커 최소 거리로 조정되었는지
    pub broker_adjusted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tp_split: Option<TpSplitPlan>,
    pub evaluated_at: DateTime<Utc>,
}

/// 거래 평가기.
#[derive(Debug, Clone)]
pub struct TradeEvaluator {
    calculator: StopTargetCalculator,
    validator: RiskRewardValidator,
    splitter: TpSplitPlanner,
}

impl TradeEvaluator {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            calculator: StopTargetCalculator::new(config),
            validator: RiskRewardValidator::new(config.rrr.clone()),
            splitter: TpSplitPlanner::new(config.tp_split.clone()),
        }
    }

    /// 설정을 검증한 뒤 평가기를 생성합니다.
    pub fn try_new(config: &RiskConfig) -> RiskResult<Self> {
        config.validate()?;
        let evaluator = Self::new(config);
        if evaluator.splitter.is_enabled() {
            evaluator.splitter.validate()?;
        }
        Ok(evaluator)
    }

    pub fn min_rrr(&self) -> f64 {
        self.validator.min_rrr()
    }

    /// 거래 제안을 평가합니다.
    ///
    /// 손익비를 맞출 수 없으면 `RiskError::RiskRewardUnmet`, 손절/목표 배치가
    /// 잘못되면 `RiskError::InvalidGeometry`를 반환합니다.
    pub fn evaluate(&self, request: &StopTargetRequest<'_>) -> RiskResult<TradePlan> {
        let span = evaluation_span!("evaluate", request.symbol(), request.side);
        let _guard = span.enter();

        let (side, entry, spec) = (request.side, request.entry, request.spec);
        let computed = self.calculator.calculate(request);

        let broker = enforce_broker_min_stops(
            side,
            entry,
            computed.stop_price,
            computed.target_price,
            spec,
        );

        let repair = RepairRequest::new(
            side,
            entry,
            broker.stop,
            broker.target,
            computed.atr,
            spec,
        )
        .with_alternates(&computed.alternate_stops, &computed.alternate_targets);
        let validated = self.validator.validate(&repair)?;

        validate_levels(side, entry, validated.stop, validated.target)?;

        let tp_split = self
            .splitter
            .plan(side, entry, validated.stop)
            .map(|split| split.aligned_to_tick(spec, entry));

        // 출처는 최종 레벨을 만든 마지막 단계 기준
        let mut stop_source = computed.stop_source;
        let mut target_source = computed.target_source;
        let mut session_adjustment = computed.session_adjustment;
        if broker.stop != computed.stop_price {
            stop_source = BROKER_MINIMUM_SOURCE.to_string();
        }
        if broker.target != computed.target_price {
            target_source = BROKER_MINIMUM_SOURCE.to_string();
            mark_adjustment_overridden(&mut session_adjustment, "broker minimum");
        }
        for step in &validated.repairs {
            if step.changes_stop() {
                stop_source = step.source_label().to_string();
            } else {
                target_source = step.source_label().to_string();
                mark_adjustment_overridden(&mut session_adjustment, "repair");
            }
        }

        let plan = TradePlan {
            symbol: spec.symbol.clone(),
            side,
            entry_price: entry,
            stop_price: validated.stop,
            target_price: validated.target,
            reward_risk_ratio: reward_risk_ratio(side, entry, validated.stop, validated.target),
            stop_source,
            target_source,
            session_adjustment,
            volatility_used: computed.volatility_used,
            atr: computed.atr,
            repairs: validated.repairs,
            broker_adjusted: broker.adjusted,
            tp_split,
            evaluated_at: request.now,
        };

        tracing::info!(
            stop = %plan.stop_price,
            target = %plan.target_price,
            ratio = plan.reward_risk_ratio,
            repairs = plan.repairs.len(),
            broker_adjusted = plan.broker_adjusted,
            "Trade plan accepted"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RiskError;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use sentinel_core::{Candle, SymbolSpec};

    fn flat(len: usize) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        (0..len)
            .map(|i| {
                Candle::new(
                    t0 + Duration::minutes(15 * i as i64),
                    dec!(1.2000),
                    dec!(1.2004),
                    dec!(1.1996),
                    dec!(1.2000),
                    Decimal::ZERO,
                )
            })
            .collect()
    }

    /// `flat(40)`의 29~31번 캔들을 바꿔 진입가 아래에 하락 오더블록을 만듭니다.
    fn with_bearish_block(bars: [(Decimal, Decimal, Decimal, Decimal); 3]) -> Vec<Candle> {
        let mut candles = flat(40);
        for (i, (open, high, low, close)) in bars.into_iter().enumerate() {
            let time = candles[29 + i].time;
            candles[29 + i] = Candle::new(time, open, high, low, close, Decimal::ZERO);
        }
        candles
    }

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_default_plan_passes() {
        let evaluator = TradeEvaluator::try_new(&RiskConfig::default()).unwrap();
        let spec = SymbolSpec::forex("EURUSD");
        let candles = flat(40);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, morning());

        let plan = evaluator.evaluate(&request).unwrap();
        assert_eq!(plan.stop_price, dec!(1.1950));
        assert_eq!(plan.target_price, dec!(1.2100));
        assert_eq!(plan.reward_risk_ratio, 2.0);
        assert!(plan.repairs.is_empty());
        assert!(!plan.broker_adjusted);
        assert!(plan.tp_split.is_none());
    }

    #[test]
    fn test_broker_minimum_and_split() {
        let mut config = RiskConfig::default();
        config.tp_split.enabled = true;
        let evaluator = TradeEvaluator::try_new(&config).unwrap();
        // 브로커 최소 거리 80 pip
        let spec = SymbolSpec::forex("EURUSD").with_min_stop_distance(dec!(0.0080));
        let candles = flat(40);
        let request = StopTargetRequest::new(&spec, Side::Sell, dec!(1.2000), &candles, morning());

        let plan = evaluator.evaluate(&request).unwrap();
        assert!(plan.broker_adjusted);
        assert_eq!(plan.stop_price, dec!(1.20802));
        assert!(plan.reward_risk_ratio >= 1.5 - 1e-9);

        let split = plan.tp_split.unwrap();
        assert!(split.tp1.price < plan.entry_price);
        assert!(split.tp2.price < split.tp1.price);
    }

    #[test]
    fn test_repair_never_tightens_below_class_minimum() {
        let mut config = RiskConfig::default();
        config.stop_target.tp_pips = dec!(60);
        let evaluator = TradeEvaluator::try_new(&config).unwrap();
        let spec = SymbolSpec::forex("EURUSD");
        // 고점 1.1997 → 버퍼 적용 후 10 pip 미만의 구조 손절
        let candles = with_bearish_block([
            (dec!(1.1990), dec!(1.1992), dec!(1.1986), dec!(1.1991)),
            (dec!(1.1996), dec!(1.1997), dec!(1.1985), dec!(1.1988)),
            (dec!(1.1990), dec!(1.1994), dec!(1.1986), dec!(1.1992)),
        ]);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, morning());

        let plan = evaluator.evaluate(&request).unwrap();
        assert_eq!(plan.stop_price, dec!(1.1950));
        assert_eq!(plan.stop_source, "config fallback (50 pips)");
        assert_eq!(plan.target_price, dec!(1.2075));
        assert_eq!(plan.target_source, "ATR fallback target (repair)");
        assert!(matches!(
            plan.repairs.as_slice(),
            [RepairStep::AtrFallbackTarget { .. }]
        ));
    }

    #[test]
    fn test_tightened_stop_reports_repair_source() {
        let mut config = RiskConfig::default();
        config.stop_target.tp_pips = dec!(60);
        config.rrr.max_sl_atr_multiple = 10.0;
        let evaluator = TradeEvaluator::try_new(&config).unwrap();
        let spec = SymbolSpec::forex("EURUSD");
        let candles = with_bearish_block([
            (dec!(1.1978), dec!(1.1980), dec!(1.1974), dec!(1.1979)),
            (dec!(1.1984), dec!(1.1985), dec!(1.1973), dec!(1.1976)),
            (dec!(1.1978), dec!(1.1982), dec!(1.1974), dec!(1.1980)),
        ]);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, morning());

        let plan = evaluator.evaluate(&request).unwrap();
        let risk_pips = spec.price_to_pips(plan.entry_price - plan.stop_price);
        assert!(risk_pips >= dec!(10) && risk_pips < dec!(50), "risk {} pips", risk_pips);
        assert_eq!(plan.stop_source, "structural stop (repair: tightened)");
        assert_eq!(plan.target_price, dec!(1.2060));
        assert_eq!(plan.target_source, "config fallback (60 pips)");
        assert!(plan.reward_risk_ratio >= 1.5);
        assert!(spec.is_on_tick(plan.stop_price));
    }

    #[test]
    fn test_repaired_target_marks_session_adjustment() {
        let mut config = RiskConfig::default();
        // 압축 목표 30 pip이 설정 거리보다 길도록
        config.stop_target.sl_pips = dec!(25);
        config.stop_target.tp_pips = dec!(20);
        let evaluator = TradeEvaluator::try_new(&config).unwrap();
        let spec = SymbolSpec::forex("EURUSD");
        let candles = flat(40);
        let evening = Utc.with_ymd_and_hms(2026, 1, 6, 16, 0, 0).unwrap();
        let request = StopTargetRequest::new(&spec, Side::Sell, dec!(1.2000), &candles, evening);

        let plan = evaluator.evaluate(&request).unwrap();
        assert_eq!(plan.target_price, dec!(1.19625));
        assert_eq!(plan.target_source, "ATR fallback target (repair)");
        assert_eq!(
            plan.session_adjustment,
            "compressed to 1.2 RRR (after 15:30 UTC), overridden by repair"
        );
    }

    #[test]
    fn test_plan_prices_are_tick_aligned() {
        let mut config = RiskConfig::default();
        config.tp_split.enabled = true;
        let evaluator = TradeEvaluator::try_new(&config).unwrap();
        let spec = SymbolSpec::forex("EURUSD").with_min_stop_distance(dec!(0.0123456));
        let candles = flat(40);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, morning());

        let plan = evaluator.evaluate(&request).unwrap();
        assert_eq!(plan.stop_source, "broker minimum distance (+2 ticks)");
        let split = plan.tp_split.unwrap();
        for price in [plan.stop_price, plan.target_price, split.tp1.price, split.tp2.price] {
            assert!(spec.is_on_tick(price), "{} not on tick", price);
        }
    }

    #[test]
    fn test_veto_propagates() {
        let mut config = RiskConfig::default();
        config.stop_target.sl_pips = dec!(400);
        config.stop_target.tp_pips = dec!(200);
        let evaluator = TradeEvaluator::try_new(&config).unwrap();
        let spec = SymbolSpec::forex("EURUSD");
        let candles = flat(40);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, morning());

        let err = evaluator.evaluate(&request).unwrap_err();
        assert!(matches!(err, RiskError::RiskRewardUnmet { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RiskConfig::default();
        config.rrr.min_rrr = 0.0;
        assert!(matches!(
            TradeEvaluator::try_new(&config),
            Err(RiskError::Config(_))
        ));
    }
}
