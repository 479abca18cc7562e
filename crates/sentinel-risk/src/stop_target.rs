//! 구조 기반 손절/목표 계산.
//!
//! 계산 순서:
//!
//! 1. 캔들이 부족하면 설정 pip 거리로 대체
//! 2. 구조 탐지 (HTF 검증이 켜져 있으면 통과한 구조만)
//! 3. 손절: 가장 가까운 반대 방향 구조 + ATR 버퍼, 없으면 설정 거리,
//!    진입가의 잘못된 쪽이면 ATR × 변동성 배수
//! 4. 목표: 가장 가까운 같은 방향 구조, 없으면 설정 거리
//! 5. 시간대 조정 (세션 후 잔고 비율 목표, 또는 장 후반 압축)
//! 6. 최종 보정: 설정 거리 또는 심볼 등급 최소 거리보다 짧으면 덮어씀

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{min_stop_pips, Candle, DecimalExt, Price, Quantity, Side, SymbolSpec};

use crate::config::{RiskConfig, SessionAdjustConfig, StopTargetConfig};
use crate::htf::HtfValidator;
use crate::indicators::latest_atr;
use crate::rrr::reward_risk_ratio;
use crate::structure::{StructureDetector, StructureSet};
use crate::volatility::{VolatilityClassifier, VolatilityRegime};

/// 세션 후 잔고 비율 목표 계산에 필요한 계좌 정보.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostSessionContext {
    /// 계좌 잔고
    pub balance: Decimal,
    /// 진입 거래량 (lot)
    pub volume: Quantity,
}

/// 계산 요청.
#[derive(Debug, Clone)]
pub struct StopTargetRequest<'a> {
    pub spec: &'a SymbolSpec,
    pub side: Side,
    pub entry: Price,
    /// 실행 타임프레임 캔들 (오래된 것부터)
    pub candles: &'a [Candle],
    /// 상위 타임프레임 캔들
    pub htf_candles: Option<&'a [Candle]>,
    /// 평가 시각 (시간대 조정 기준)
    pub now: DateTime<Utc>,
    pub post_session: Option<PostSessionContext>,
}

impl<'a> StopTargetRequest<'a> {
    pub fn new(
        spec: &'a SymbolSpec,
        side: Side,
        entry: Price,
        candles: &'a [Candle],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            spec,
            side,
            entry,
            candles,
            htf_candles: None,
            now,
            post_session: None,
        }
    }

    pub fn with_htf_candles(mut self, candles: &'a [Candle]) -> Self {
        self.htf_candles = Some(candles);
        self
    }

    pub fn with_post_session(mut self, context: PostSessionContext) -> Self {
        self.post_session = Some(context);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.spec.symbol
    }
}

/// 계산 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTargetResult {
    pub stop_price: Price,
    pub target_price: Price,
    pub reward_risk_ratio: f64,
    /// 손절 출처
    pub stop_source: String,
    /// 목표 출처
    pub target_source: String,
    /// 시간대 조정 내용 ("none"이면 조정 없음)
    pub session_adjustment: String,
    pub volatility_used: VolatilityRegime,
    /// 최근 ATR (계산 불가 시 0)
    pub atr: Decimal,
    /// 허용 구조 손절 후보 (버퍼 적용, 가까운 순)
    pub alternate_stops: Vec<Price>,
    /// 허용 구조 목표 후보 (가까운 순)
    pub alternate_targets: Vec<Price>,
}

const NO_ADJUSTMENT: &str = "none";

/// 손절/목표 계산기. 호출 간 상태를 갖지 않습니다.
#[derive(Debug, Clone)]
pub struct StopTargetCalculator {
    config: StopTargetConfig,
    detector: StructureDetector,
    volatility: VolatilityClassifier,
    htf: Option<HtfValidator>,
}

impl StopTargetCalculator {
    pub fn new(config: &RiskConfig) -> Self {
        let st = config.stop_target.clone();
        Self {
            detector: StructureDetector::new(st.structure_lookback),
            volatility: VolatilityClassifier::new(config.volatility.clone(), st.atr_period),
            htf: config
                .htf
                .enabled
                .then(|| HtfValidator::new(config.htf.min_score)),
            config: st,
        }
    }

    pub fn config(&self) -> &StopTargetConfig {
        &self.config
    }

    /// 손절/목표를 계산합니다.
    pub fn calculate(&self, request: &StopTargetRequest<'_>) -> StopTargetResult {
        let symbol = request.symbol();
        let (side, entry) = (request.side, request.entry);
        let sl_pips = self.config.sl_pips_for(symbol);
        let tp_pips = self.config.tp_pips_for(symbol);

        let volatility = self.volatility.classify(request.candles);
        let atr = latest_atr(request.candles, self.config.atr_period).unwrap_or(Decimal::ZERO);

        if request.candles.len() < self.detector.lookback() {
            tracing::info!(
                symbol = symbol,
                candles = request.candles.len(),
                required = self.detector.lookback(),
                "Not enough candles for structure analysis, using configured distances"
            );
            let mut result = StopTargetResult {
                stop_price: side.stop_from(entry, request.spec.pips_to_price(sl_pips)),
                target_price: side.target_from(entry, request.spec.pips_to_price(tp_pips)),
                reward_risk_ratio: 0.0,
                stop_source: config_source(sl_pips),
                target_source: config_source(tp_pips),
                session_adjustment: NO_ADJUSTMENT.to_string(),
                volatility_used: volatility,
                atr,
                alternate_stops: Vec::new(),
                alternate_targets: Vec::new(),
            };
            self.apply_minimum_distances(request, &mut result);
            return result;
        }

        let structures = self.admitted_structures(request);
        let buffer = atr
            .mul_f64(self.config.buffer_atr_fraction)
            .min(request.spec.pips_to_price(self.config.buffer_max_pips));

        let stop_candidates = structures.stop_candidates(entry, side);
        let alternate_stops: Vec<Price> = stop_candidates
            .iter()
            .map(|s| request.spec.round_away_from(side.stop_from(s.price, buffer), entry))
            .collect();
        let target_candidates = structures.target_candidates(entry, side);
        let alternate_targets: Vec<Price> = target_candidates
            .iter()
            .map(|s| request.spec.round_away_from(s.price, entry))
            .collect();

        let (stop_price, stop_source) = match stop_candidates.first() {
            Some(s) => (
                side.stop_from(s.price, buffer),
                format!("{} + ATR buffer", s.kind.label()),
            ),
            None => (
                side.stop_from(entry, request.spec.pips_to_price(sl_pips)),
                config_source(sl_pips),
            ),
        };

        let (stop_price, stop_source) = ensure_stop_behind_entry(
            symbol,
            side,
            entry,
            (stop_price, stop_source),
            atr,
            volatility.multiplier,
        );

        let (target_price, target_source) = match target_candidates.first() {
            Some(s) => (s.price, s.kind.label().to_string()),
            None => (
                side.target_from(entry, request.spec.pips_to_price(tp_pips)),
                config_source(tp_pips),
            ),
        };

        let mut result = StopTargetResult {
            stop_price,
            target_price,
            reward_risk_ratio: 0.0,
            stop_source,
            target_source,
            session_adjustment: NO_ADJUSTMENT.to_string(),
            volatility_used: volatility,
            atr,
            alternate_stops,
            alternate_targets,
        };

        self.apply_session_adjustment(request, &mut result);
        self.apply_minimum_distances(request, &mut result);

        tracing::debug!(
            symbol = symbol,
            side = %side,
            stop = %result.stop_price,
            target = %result.target_price,
            ratio = result.reward_risk_ratio,
            stop_source = %result.stop_source,
            target_source = %result.target_source,
            "Stop/target calculated"
        );
        result
    }

    fn admitted_structures(&self, request: &StopTargetRequest<'_>) -> StructureSet {
        let structures = self.detector.detect(request.candles);
        match &self.htf {
            Some(validator) => validator.filter(structures, request.htf_candles.unwrap_or(&[])),
            None => structures,
        }
    }

    /// 세션 후 구간이면 잔고 비율 목표, 압축 시각 이후면 손절 거리 배수로 목표를 바꿉니다.
    fn apply_session_adjustment(
        &self,
        request: &StopTargetRequest<'_>,
        result: &mut StopTargetResult,
    ) {
        let session: &SessionAdjustConfig = &self.config.session;
        let (side, entry) = (request.side, request.entry);
        let time = request.now.time();

        let in_post_session =
            time >= session.post_session_start_utc && time < session.post_session_end_utc;
        if session.post_session_target_enabled && in_post_session {
            if let Some(distance) = request.post_session.and_then(|ctx| {
                let amount = ctx.balance.mul_f64(session.post_session_target_pct / 100.0);
                request.spec.price_distance_for_amount(amount, ctx.volume)
            }) {
                if distance > Decimal::ZERO {
                    result.target_price = side.target_from(entry, distance);
                    result.target_source = "post-session balance target".to_string();
                    result.session_adjustment = format!(
                        "post-session {}% balance target",
                        session.post_session_target_pct
                    );
                    return;
                }
            }
            tracing::debug!(
                symbol = request.symbol(),
                "Post-session target skipped: account context unavailable"
            );
        }

        if session.compress_enabled && time >= session.compress_after_utc {
            let risk = side.risk_distance(entry, result.stop_price);
            result.target_price = side.target_from(entry, risk.mul_f64(session.compress_rrr));
            result.session_adjustment = format!(
                "compressed to {} RRR (after {} UTC)",
                session.compress_rrr,
                session.compress_after_utc.format("%H:%M")
            );
        }
    }

    /// 설정 거리와 심볼 등급 최소 거리보다 짧은 거리를 덮어쓰고 손익비를 다시 계산합니다.
    fn apply_minimum_distances(
        &self,
        request: &StopTargetRequest<'_>,
        result: &mut StopTargetResult,
    ) {
        let spec = request.spec;
        let (side, entry) = (request.side, request.entry);
        let symbol = request.symbol();
        let sl_pips = self.config.sl_pips_for(symbol);
        let tp_pips = self.config.tp_pips_for(symbol);
        let class_min = min_stop_pips(symbol);

        if side.risk_distance(entry, result.stop_price) < spec.pips_to_price(sl_pips) {
            result.stop_price = side.stop_from(entry, spec.pips_to_price(sl_pips));
            result.stop_source = config_source(sl_pips);
        }
        if side.risk_distance(entry, result.stop_price) < spec.pips_to_price(class_min) {
            result.stop_price = side.stop_from(entry, spec.pips_to_price(class_min));
            result.stop_source = minimum_source(class_min);
        }

        let mut target_override = None;
        if side.reward_distance(entry, result.target_price) < spec.pips_to_price(tp_pips) {
            result.target_price = side.target_from(entry, spec.pips_to_price(tp_pips));
            result.target_source = config_source(tp_pips);
            target_override = Some("config distance");
        }
        if side.reward_distance(entry, result.target_price) < spec.pips_to_price(class_min) {
            result.target_price = side.target_from(entry, spec.pips_to_price(class_min));
            result.target_source = minimum_source(class_min);
            target_override = Some("minimum distance");
        }
        if let Some(by) = target_override {
            mark_adjustment_overridden(&mut result.session_adjustment, by);
        }

        // 호가 단위 정렬은 진입가에서 멀어지는 쪽으로만
        result.stop_price = spec.round_away_from(result.stop_price, entry);
        result.target_price = spec.round_away_from(result.target_price, entry);
        result.reward_risk_ratio =
            reward_risk_ratio(side, entry, result.stop_price, result.target_price);
    }
}

/// 손절이 진입가의 잘못된 쪽이면 ATR × 변동성 배수 손절로 바꿉니다.
fn ensure_stop_behind_entry(
    symbol: &str,
    side: Side,
    entry: Price,
    (stop, source): (Price, String),
    atr: Decimal,
    multiplier: f64,
) -> (Price, String) {
    if side.is_behind(entry, stop) {
        return (stop, source);
    }
    tracing::warn!(
        symbol = symbol,
        side = %side,
        stop = %stop,
        entry = %entry,
        "Structural stop on the wrong side of entry, using ATR fallback"
    );
    (
        side.stop_from(entry, atr.mul_f64(multiplier)),
        format!(
            "ATR fallback (invalid structure fallback, {:.1}x)",
            multiplier
        ),
    )
}

/// 시간대 조정된 목표가 다른 규칙으로 덮어써졌음을 표시합니다.
pub(crate) fn mark_adjustment_overridden(adjustment: &mut String, by: &str) {
    if adjustment.as_str() != NO_ADJUSTMENT && !adjustment.contains("overridden") {
        *adjustment = format!("{}, overridden by {}", adjustment, by);
    }
}

fn config_source(pips: Decimal) -> String {
    format!("config fallback ({} pips)", pips.normalize())
}

fn minimum_source(pips: Decimal) -> String {
    format!("minimum distance ({} pips)", pips.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymbolStopConfig;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 6, hour, minute, 0).unwrap()
    }

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

    #[test]
    fn test_short_window_uses_configured_distances() {
        let calculator = StopTargetCalculator::new(&RiskConfig::default());
        let spec = SymbolSpec::forex("EURUSD");
        let candles = flat(10);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, at(9, 0));

        let result = calculator.calculate(&request);
        assert_eq!(result.stop_price, dec!(1.1950));
        assert_eq!(result.target_price, dec!(1.2100));
        assert_eq!(result.reward_risk_ratio, 2.0);
        assert_eq!(result.stop_source, "config fallback (50 pips)");
        assert_eq!(result.session_adjustment, "none");
    }

    #[test]
    fn test_jpy_minimum_distance() {
        let mut config = RiskConfig::default();
        config.stop_target.set_symbol_config(
            "USDJPY",
            SymbolStopConfig {
                sl_pips: Some(dec!(5)),
                tp_pips: Some(dec!(12)),
            },
        );
        let calculator = StopTargetCalculator::new(&config);
        let spec = SymbolSpec::forex("USDJPY");
        let candles = flat(5);
        let request = StopTargetRequest::new(&spec, Side::Sell, dec!(150.00), &candles, at(9, 0));

        let result = calculator.calculate(&request);
        // JPY 최소 15 pip
        assert_eq!(result.stop_price, dec!(150.15));
        assert_eq!(result.target_price, dec!(149.85));
        assert_eq!(result.stop_source, "minimum distance (15 pips)");
        assert_eq!(result.reward_risk_ratio, 1.0);
    }

    #[test]
    fn test_flat_window_without_structures_falls_back() {
        let calculator = StopTargetCalculator::new(&RiskConfig::default());
        let spec = SymbolSpec::forex("EURUSD");
        let candles = flat(40);
        let request = StopTargetRequest::new(&spec, Side::Sell, dec!(1.2000), &candles, at(9, 0));

        let result = calculator.calculate(&request);
        assert_eq!(result.stop_price, dec!(1.2050));
        assert_eq!(result.target_price, dec!(1.1900));
        assert!(result.alternate_stops.is_empty());
        assert_eq!(result.atr, dec!(0.0008));
    }

    #[test]
    fn test_compression_after_cutoff() {
        let mut config = RiskConfig::default();
        // 설정 목표가 압축 결과를 덮어쓰지 않도록 작게
        config.stop_target.tp_pips = dec!(10);
        let calculator = StopTargetCalculator::new(&config);
        let spec = SymbolSpec::forex("EURUSD");
        let candles = flat(40);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, at(16, 0));

        let result = calculator.calculate(&request);
        assert_eq!(result.target_price, dec!(1.2060));
        assert_eq!(result.reward_risk_ratio, 1.2);
        assert_eq!(
            result.session_adjustment,
            "compressed to 1.2 RRR (after 15:30 UTC)"
        );
    }

    #[test]
    fn test_post_session_balance_target() {
        let mut config = RiskConfig::default();
        config.stop_target.session.post_session_target_enabled = true;
        let calculator = StopTargetCalculator::new(&config);
        let spec = SymbolSpec::forex("EURUSD");
        let candles = flat(40);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, at(17, 30))
            .with_post_session(PostSessionContext {
                balance: dec!(100000),
                volume: dec!(1),
            });

        let result = calculator.calculate(&request);
        // 1.5% = 1500달러, pip당 10달러 → 150 pip
        assert_eq!(result.target_price, dec!(1.2150));
        assert_eq!(result.session_adjustment, "post-session 1.5% balance target");
        assert_eq!(result.reward_risk_ratio, 3.0);

        // 계좌 정보가 없으면 압축으로 진행 (60 pip 목표는 설정 100 pip에 덮어씀)
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, at(17, 30));
        let result = calculator.calculate(&request);
        assert!(result.session_adjustment.starts_with("compressed"));
        assert!(result.session_adjustment.ends_with("overridden by config distance"));
    }

    #[test]
    fn test_compression_undone_by_config_distance_is_reported() {
        let calculator = StopTargetCalculator::new(&RiskConfig::default());
        let spec = SymbolSpec::forex("EURUSD");
        let candles = flat(20);
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, at(16, 0));

        let result = calculator.calculate(&request);
        assert_eq!(result.target_price, dec!(1.2100));
        assert_eq!(result.target_source, "config fallback (100 pips)");
        assert_eq!(
            result.session_adjustment,
            "compressed to 1.2 RRR (after 15:30 UTC), overridden by config distance"
        );
    }

    #[test]
    fn test_override_marker_is_applied_once() {
        let mut adjustment = "none".to_string();
        mark_adjustment_overridden(&mut adjustment, "config distance");
        assert_eq!(adjustment, "none");

        let mut adjustment = "post-session 1.5% balance target".to_string();
        mark_adjustment_overridden(&mut adjustment, "minimum distance");
        mark_adjustment_overridden(&mut adjustment, "repair");
        assert_eq!(
            adjustment,
            "post-session 1.5% balance target, overridden by minimum distance"
        );
    }

    #[test]
    fn test_wrong_side_stop_uses_atr_multiple() {
        // 매수인데 손절이 진입가 위
        let (stop, source) = ensure_stop_behind_entry(
            "EURUSD",
            Side::Buy,
            dec!(1.2000),
            (dec!(1.2010), "order block + ATR buffer".to_string()),
            dec!(0.0020),
            1.5,
        );
        assert_eq!(stop, dec!(1.1970));
        assert_eq!(source, "ATR fallback (invalid structure fallback, 1.5x)");

        // 진입가와 같은 손절도 잘못된 쪽
        let (stop, _) = ensure_stop_behind_entry(
            "EURUSD",
            Side::Sell,
            dec!(1.2000),
            (dec!(1.2000), "config fallback (50 pips)".to_string()),
            dec!(0.0010),
            2.0,
        );
        assert_eq!(stop, dec!(1.2020));

        let kept = ensure_stop_behind_entry(
            "EURUSD",
            Side::Sell,
            dec!(1.2000),
            (dec!(1.2050), "config fallback (50 pips)".to_string()),
            dec!(0.0010),
            2.0,
        );
        assert_eq!(kept, (dec!(1.2050), "config fallback (50 pips)".to_string()));
    }

    #[test]
    fn test_structural_levels_are_tick_aligned() {
        let calculator = StopTargetCalculator::new(&RiskConfig::default());
        let spec = SymbolSpec::forex("EURUSD");
        let mut candles = flat(40);
        // 진입가 아래 고점 1.1997의 하락 오더블록
        for (i, (open, high, low, close)) in [
            (dec!(1.1990), dec!(1.1992), dec!(1.1986), dec!(1.1991)),
            (dec!(1.1996), dec!(1.1997), dec!(1.1985), dec!(1.1988)),
            (dec!(1.1990), dec!(1.1994), dec!(1.1986), dec!(1.1992)),
        ]
        .into_iter()
        .enumerate()
        {
            let time = candles[29 + i].time;
            candles[29 + i] = Candle::new(time, open, high, low, close, Decimal::ZERO);
        }
        let request = StopTargetRequest::new(&spec, Side::Buy, dec!(1.2000), &candles, at(9, 0));

        let result = calculator.calculate(&request);
        assert!(!result.alternate_stops.is_empty());
        for price in result
            .alternate_stops
            .iter()
            .chain(&result.alternate_targets)
            .chain([&result.stop_price, &result.target_price])
        {
            assert!((*price % spec.tick_size).is_zero(), "{} not on tick", price);
        }
    }
}
