//! 손익비(RRR) 검증 및 보정.
//!
//! 최소 손익비에 못 미치면 다음 순서로 보정을 시도하고, 첫 성공에서 멈춥니다:
//!
//! 1. 더 가까운 구조 손절로 조이기 (브로커/심볼 등급 최소 거리, ATR 상한 준수)
//! 2. 더 먼 구조 목표로 늘리기 (pip 범위 내)
//! 3. 최소 손익비를 맞추는 ATR 대체 목표 (pip 범위로 제한)
//! 4. 정확히 최소 손익비인 강제 목표 (pip 범위를 벗어나면 실패)
//!
//! 모든 단계가 실패하면 거래를 거부합니다. 각 단계는 현재 손익비를
//! 낮추지 않을 때만 적용됩니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{min_stop_pips, DecimalExt, Price, Side, SymbolSpec};

use crate::config::RrrConfig;
use crate::error::{RiskError, RiskResult};

const RATIO_EPSILON: f64 = 1e-9;

/// 방향을 고려한 손익비. 손절 거리가 0 이하이면 0입니다.
pub fn reward_risk_ratio(side: Side, entry: Price, stop: Price, target: Price) -> f64 {
    let risk = side.risk_distance(entry, stop);
    if risk <= Decimal::ZERO {
        return 0.0;
    }
    (side.reward_distance(entry, target) / risk).to_f64_lossy()
}

/// 적용된 보정 단계.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RepairStep {
    /// 구조 손절로 조임
    TightenStop { from: Price, to: Price },
    /// 구조 목표로 늘림
    ExtendTarget { from: Price, to: Price },
    /// ATR 대체 목표
    AtrFallbackTarget { from: Price, to: Price },
    /// 최소 손익비 강제 목표
    ForcedTarget { from: Price, to: Price },
}

impl RepairStep {
    pub fn describe(&self) -> String {
        match self {
            RepairStep::TightenStop { from, to } => {
                format!("tightened stop from {} to {}", from, to)
            }
            RepairStep::ExtendTarget { from, to } => {
                format!("extended target from {} to {}", from, to)
            }
            RepairStep::AtrFallbackTarget { from, to } => {
                format!("ATR fallback target from {} to {}", from, to)
            }
            RepairStep::ForcedTarget { from, to } => {
                format!("forced minimum-ratio target from {} to {}", from, to)
            }
        }
    }

    /// 손절을 바꾸는 단계인지.
    pub fn changes_stop(&self) -> bool {
        matches!(self, RepairStep::TightenStop { .. })
    }

    /// 보정된 레벨의 출처 문자열.
    pub fn source_label(&self) -> &'static str {
        match self {
            RepairStep::TightenStop { .. } => "structural stop (repair: tightened)",
            RepairStep::ExtendTarget { .. } => "structural target (repair: extended)",
            RepairStep::AtrFallbackTarget { .. } => "ATR fallback target (repair)",
            RepairStep::ForcedTarget { .. } => "forced minimum-ratio target (repair)",
        }
    }
}

/// 검증/보정 입력.
#[derive(Debug, Clone)]
pub struct RepairRequest<'a> {
    pub side: Side,
    pub entry: Price,
    pub stop: Price,
    pub target: Price,
    /// 손절 상한 계산용 ATR
    pub atr: Decimal,
    pub spec: &'a SymbolSpec,
    /// 구조 손절 후보 (버퍼 적용)
    pub alternate_stops: &'a [Price],
    /// 구조 목표 후보
    pub alternate_targets: &'a [Price],
}

impl<'a> RepairRequest<'a> {
    pub fn new(
        side: Side,
        entry: Price,
        stop: Price,
        target: Price,
        atr: Decimal,
        spec: &'a SymbolSpec,
    ) -> Self {
        Self {
            side,
            entry,
            stop,
            target,
            atr,
            spec,
            alternate_stops: &[],
            alternate_targets: &[],
        }
    }

    pub fn with_alternates(mut self, stops: &'a [Price], targets: &'a [Price]) -> Self {
        self.alternate_stops = stops;
        self.alternate_targets = targets;
        self
    }
}

/// 검증을 통과한 손절/목표.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedLevels {
    pub stop: Price,
    pub target: Price,
    pub ratio: f64,
    pub repairs: Vec<RepairStep>,
}

impl ValidatedLevels {
    pub fn was_repaired(&self) -> bool {
        !self.repairs.is_empty()
    }
}

/// 손익비 검증기.
#[derive(Debug, Clone)]
pub struct RiskRewardValidator {
    config: RrrConfig,
}

struct Working {
    stop: Price,
    target: Price,
    ratio: f64,
    repairs: Vec<RepairStep>,
}

impl RiskRewardValidator {
    pub fn new(config: RrrConfig) -> Self {
        Self { config }
    }

    pub fn min_rrr(&self) -> f64 {
        self.config.min_rrr
    }

    fn meets_minimum(&self, ratio: f64) -> bool {
        ratio + RATIO_EPSILON >= self.config.min_rrr
    }

    /// 손익비를 검증하고 필요하면 보정합니다.
    ///
    /// 보정으로도 최소 손익비에 도달하지 못하면 `RiskError::RiskRewardUnmet`을 반환합니다.
    pub fn validate(&self, request: &RepairRequest<'_>) -> RiskResult<ValidatedLevels> {
        let side = request.side;
        let entry = request.entry;
        let mut work = Working {
            stop: request.stop,
            target: request.target,
            ratio: reward_risk_ratio(side, entry, request.stop, request.target),
            repairs: Vec::new(),
        };

        if self.meets_minimum(work.ratio) {
            return Ok(Self::accept(work));
        }

        if !self.config.enable_repair {
            return Err(self.veto(&work, "repair disabled"));
        }

        tracing::info!(
            symbol = %request.spec.symbol,
            side = %side,
            ratio = work.ratio,
            minimum = self.config.min_rrr,
            "Attempting risk-reward repair"
        );

        if let Some(stop) = self.tighter_structural_stop(request, work.stop) {
            let target = work.target;
            self.try_step(&mut work, request, stop, target, |from, to| {
                RepairStep::TightenStop { from, to }
            });
            if self.meets_minimum(work.ratio) {
                return Ok(Self::accept(work));
            }
        }

        if let Some(target) = self.farther_structural_target(request, work.target) {
            let stop = work.stop;
            self.try_step(&mut work, request, stop, target, |from, to| {
                RepairStep::ExtendTarget { from, to }
            });
            if self.meets_minimum(work.ratio) {
                return Ok(Self::accept(work));
            }
        }

        let (min_tp, max_tp) = self.target_bounds(request.spec);
        let required = side.risk_distance(entry, work.stop).mul_f64(self.config.min_rrr);

        if self.config.allow_atr_fallback && request.atr > Decimal::ZERO {
            let distance = required.max(min_tp).min(max_tp);
            let target = request
                .spec
                .round_away_from(side.target_from(entry, distance), entry);
            let stop = work.stop;
            self.try_step(&mut work, request, stop, target, |from, to| {
                RepairStep::AtrFallbackTarget { from, to }
            });
            if self.meets_minimum(work.ratio) {
                return Ok(Self::accept(work));
            }
        }

        // pip 범위는 호가 단위 배수라 올림 뒤 비교해도 같음
        let forced = request
            .spec
            .round_away_from(side.target_from(entry, required), entry);
        let required = side.reward_distance(entry, forced);

        if required < min_tp {
            return Err(self.veto(
                &work,
                &format!(
                    "forced target below {} pips",
                    self.config.min_tp_pips.normalize()
                ),
            ));
        }
        if required > max_tp {
            return Err(self.veto(
                &work,
                &format!(
                    "forced target exceeds {} pips",
                    self.config.max_tp_pips.normalize()
                ),
            ));
        }

        let stop = work.stop;
        self.try_step(&mut work, request, stop, forced, |from, to| {
            RepairStep::ForcedTarget { from, to }
        });
        if self.meets_minimum(work.ratio) {
            return Ok(Self::accept(work));
        }

        Err(self.veto(&work, "all repair steps exhausted"))
    }

    fn accept(work: Working) -> ValidatedLevels {
        if !work.repairs.is_empty() {
            tracing::info!(
                ratio = work.ratio,
                steps = work.repairs.len(),
                "Risk-reward repaired"
            );
        }
        ValidatedLevels {
            stop: work.stop,
            target: work.target,
            ratio: work.ratio,
            repairs: work.repairs,
        }
    }

    fn veto(&self, work: &Working, reason: &str) -> RiskError {
        tracing::warn!(
            ratio = work.ratio,
            minimum = self.config.min_rrr,
            reason = reason,
            "Trade vetoed: insufficient risk-reward"
        );
        RiskError::RiskRewardUnmet {
            ratio: work.ratio,
            minimum: self.config.min_rrr,
            reason: reason.to_string(),
        }
    }

    /// 손익비를 낮추지 않는 경우에만 단계를 적용합니다.
    fn try_step(
        &self,
        work: &mut Working,
        request: &RepairRequest<'_>,
        stop: Price,
        target: Price,
        step: impl Fn(Price, Price) -> RepairStep,
    ) {
        let ratio = reward_risk_ratio(request.side, request.entry, stop, target);
        if ratio < work.ratio {
            tracing::debug!(ratio = ratio, current = work.ratio, "Repair step skipped");
            return;
        }

        let record = if stop != work.stop {
            step(work.stop, stop)
        } else {
            step(work.target, target)
        };
        tracing::debug!(step = %record.describe(), ratio = ratio, "Repair step applied");

        work.stop = stop;
        work.target = target;
        work.ratio = ratio;
        work.repairs.push(record);
    }

    fn target_bounds(&self, spec: &SymbolSpec) -> (Decimal, Decimal) {
        (
            spec.pips_to_price(self.config.min_tp_pips),
            spec.pips_to_price(self.config.max_tp_pips),
        )
    }

    /// 현재보다 가깝고 최소 거리와 ATR 상한을 지키는 구조 손절 중 진입가에 가장 가까운 것.
    fn tighter_structural_stop(&self, request: &RepairRequest<'_>, current: Price) -> Option<Price> {
        let side = request.side;
        let current_risk = side.risk_distance(request.entry, current);
        let min_risk = request
            .spec
            .min_stop_distance
            .max(request.spec.pips_to_price(min_stop_pips(&request.spec.symbol)));
        let max_risk = request.atr.mul_f64(self.config.max_sl_atr_multiple);

        request
            .alternate_stops
            .iter()
            .copied()
            .filter(|stop| {
                let risk = side.risk_distance(request.entry, *stop);
                risk > Decimal::ZERO && risk < current_risk && risk >= min_risk && risk <= max_risk
            })
            .min_by_key(|stop| side.risk_distance(request.entry, *stop))
    }

    /// 현재보다 멀고 pip 범위 안에 있는 구조 목표 중 가장 먼 것.
    fn farther_structural_target(
        &self,
        request: &RepairRequest<'_>,
        current: Price,
    ) -> Option<Price> {
        let side = request.side;
        let current_reward = side.reward_distance(request.entry, current);
        let (min_tp, max_tp) = self.target_bounds(request.spec);

        request
            .alternate_targets
            .iter()
            .copied()
            .filter(|target| {
                let reward = side.reward_distance(request.entry, *target);
                reward > current_reward && reward >= min_tp && reward <= max_tp
            })
            .max_by_key(|target| side.reward_distance(request.entry, *target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn validator() -> RiskRewardValidator {
        RiskRewardValidator::new(RrrConfig::default())
    }

    fn eurusd() -> SymbolSpec {
        SymbolSpec::forex("EURUSD")
    }

    #[test]
    fn test_ratio_is_direction_aware() {
        assert_eq!(
            reward_risk_ratio(Side::Buy, dec!(1.2000), dec!(1.1950), dec!(1.2100)),
            2.0
        );
        assert_eq!(
            reward_risk_ratio(Side::Sell, dec!(1.2000), dec!(1.2050), dec!(1.1925)),
            1.5
        );
        // 손절이 잘못된 쪽
        assert_eq!(
            reward_risk_ratio(Side::Buy, dec!(1.2000), dec!(1.2050), dec!(1.2100)),
            0.0
        );
    }

    #[test]
    fn test_acceptable_ratio_is_unchanged() {
        let spec = eurusd();
        let request = RepairRequest::new(
            Side::Buy,
            dec!(1.2000),
            dec!(1.1950),
            dec!(1.2100),
            dec!(0.0020),
            &spec,
        );
        let result = validator().validate(&request).unwrap();

        assert_eq!(result.stop, dec!(1.1950));
        assert_eq!(result.target, dec!(1.2100));
        assert!(!result.was_repaired());
    }

    #[test]
    fn test_tighten_stop_first() {
        let spec = eurusd();
        let stops = [dec!(1.1980), dec!(1.1990), dec!(1.1999)];
        // 손절 50 pip, 목표 40 pip → 0.8
        let request = RepairRequest::new(
            Side::Buy,
            dec!(1.2000),
            dec!(1.1950),
            dec!(1.2040),
            dec!(0.0020),
            &spec,
        )
        .with_alternates(&stops, &[]);
        let result = validator().validate(&request).unwrap();

        // 1.1999 (1 pip)는 10 pip 최소 거리 미만 → ATR 상한 안에서 1.1990
        assert_eq!(result.stop, dec!(1.1990));
        assert_eq!(result.target, dec!(1.2040));
        assert_eq!(result.ratio, 4.0);
        assert_eq!(
            result.repairs,
            vec![RepairStep::TightenStop {
                from: dec!(1.1950),
                to: dec!(1.1990)
            }]
        );
        assert_eq!(result.repairs[0].source_label(), "structural stop (repair: tightened)");
    }

    #[test]
    fn test_tighten_respects_symbol_class_minimum() {
        let spec = SymbolSpec::forex("USDJPY");
        // 12 pip 구조 손절은 JPY 최소 15 pip 미만
        let stops = [dec!(149.88)];
        let request = RepairRequest::new(
            Side::Buy,
            dec!(150.00),
            dec!(149.50),
            dec!(150.60),
            dec!(0.30),
            &spec,
        )
        .with_alternates(&stops, &[]);
        let result = validator().validate(&request).unwrap();

        assert_eq!(result.stop, dec!(149.50));
        assert!(!result.repairs.iter().any(RepairStep::changes_stop));
        assert_eq!(result.target, dec!(150.75));
    }

    #[test]
    fn test_repaired_target_is_tick_aligned() {
        let spec = eurusd();
        // 손절 33.3333 pip → 필요한 목표 49.99995 pip
        let request = RepairRequest::new(
            Side::Sell,
            dec!(1.2000),
            dec!(1.203333333),
            dec!(1.1990),
            dec!(0.0010),
            &spec,
        );
        let result = validator().validate(&request).unwrap();

        assert!(spec.is_on_tick(result.target));
        assert!(result.target < dec!(1.2000));
        assert!(result.ratio >= 1.5);
    }

    #[test]
    fn test_extend_target_picks_farthest_in_bounds() {
        let spec = eurusd();
        let targets = [dec!(1.2060), dec!(1.2080), dec!(1.2600)];
        let request = RepairRequest::new(
            Side::Buy,
            dec!(1.2000),
            dec!(1.1950),
            dec!(1.2025),
            dec!(0.0010),
            &spec,
        )
        .with_alternates(&[], &targets);
        let result = validator().validate(&request).unwrap();

        // 600 pip인 1.2600은 상한 500 pip을 넘으므로 제외
        assert_eq!(result.target, dec!(1.2080));
        assert_eq!(result.ratio, 1.6);
    }

    #[test]
    fn test_atr_fallback_reaches_exact_minimum() {
        let spec = eurusd();
        let request = RepairRequest::new(
            Side::Buy,
            dec!(1.2000),
            dec!(1.1950),
            dec!(1.2025),
            dec!(0.0010),
            &spec,
        );
        let result = validator().validate(&request).unwrap();

        assert_eq!(result.target, dec!(1.2075));
        assert_eq!(result.ratio, 1.5);
        assert!(matches!(
            result.repairs.as_slice(),
            [RepairStep::AtrFallbackTarget { .. }]
        ));
    }

    #[test]
    fn test_forced_target_without_atr_fallback() {
        let spec = eurusd();
        let config = RrrConfig {
            allow_atr_fallback: false,
            ..Default::default()
        };
        let request = RepairRequest::new(
            Side::Sell,
            dec!(1.2000),
            dec!(1.2050),
            dec!(1.1975),
            dec!(0.0010),
            &spec,
        );
        let result = RiskRewardValidator::new(config).validate(&request).unwrap();

        assert_eq!(result.target, dec!(1.1925));
        assert_eq!(result.ratio, 1.5);
        assert!(matches!(
            result.repairs.as_slice(),
            [RepairStep::ForcedTarget { .. }]
        ));
    }

    #[test]
    fn test_veto_when_forced_target_exceeds_bounds() {
        let spec = eurusd();
        // 손절 400 pip → 필요한 목표 600 pip > 500 pip
        let request = RepairRequest::new(
            Side::Buy,
            dec!(1.2000),
            dec!(1.1600),
            dec!(1.2200),
            dec!(0.0010),
            &spec,
        );
        let err = validator().validate(&request).unwrap_err();

        match err {
            RiskError::RiskRewardUnmet {
                minimum, reason, ..
            } => {
                assert_eq!(minimum, 1.5);
                assert_eq!(reason, "forced target exceeds 500 pips");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_repair_disabled_vetoes() {
        let spec = eurusd();
        let config = RrrConfig {
            enable_repair: false,
            ..Default::default()
        };
        let request = RepairRequest::new(
            Side::Buy,
            dec!(1.2000),
            dec!(1.1950),
            dec!(1.2025),
            dec!(0.0010),
            &spec,
        );
        let err = RiskRewardValidator::new(config).validate(&request).unwrap_err();
        assert!(err.is_veto());
    }
}
