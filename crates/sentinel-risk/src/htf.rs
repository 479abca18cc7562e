//! 상위 타임프레임(HTF) 구조 검증.
//!
//! 하위 타임프레임에서 찾은 구조가 상위 타임프레임에서도 의미가 있는지
//! 0~1 점수로 평가합니다:
//!
//! | 항목 | 배점 |
//! |------|------|
//! | 최근 50봉 가격대의 1% 이내 | 0.4 |
//! | HTF 추세 방향 일치 (중립이면 절반) | 0.2 / 0.1 |
//! | 형성 후 경과 (5~50봉 / 1~100봉) | 0.2 / 0.1 |
//! | 강도 | 0.2 × strength |

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use sentinel_core::Candle;

use crate::indicators::sma;
use crate::structure::{Structure, StructureDirection, StructureSet};

/// 점수 계산에 필요한 최소 HTF 캔들 수.
pub const HTF_MIN_CANDLES: usize = 50;
/// HTF 데이터가 부족할 때의 중립 통과 점수.
pub const NEUTRAL_PASS_SCORE: f64 = 0.6;
/// 추세 판단 이동평균 기간.
pub const BIAS_SMA_PERIOD: usize = 20;

const PROXIMITY_BARS: usize = 50;
const PROXIMITY_WEIGHT: f64 = 0.4;
const BIAS_WEIGHT: f64 = 0.2;
const AGE_WEIGHT: f64 = 0.2;
const STRENGTH_WEIGHT: f64 = 0.2;
const SCORE_EPSILON: f64 = 1e-9;

/// HTF 추세 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HtfBias {
    Bullish,
    Bearish,
    Neutral,
}

/// 마지막 종가와 20기간 이동평균을 비교하여 추세를 판단합니다 (±0.1% 중립 구간).
pub fn htf_bias(candles: &[Candle]) -> HtfBias {
    if candles.len() < BIAS_SMA_PERIOD {
        return HtfBias::Neutral;
    }

    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
    let Some(Some(average)) = sma(&closes, BIAS_SMA_PERIOD).last().copied() else {
        return HtfBias::Neutral;
    };
    let last_close = closes[closes.len() - 1];

    if last_close > average * dec!(1.001) {
        HtfBias::Bullish
    } else if last_close < average * dec!(0.999) {
        HtfBias::Bearish
    } else {
        HtfBias::Neutral
    }
}

/// HTF 검증기.
#[derive(Debug, Clone)]
pub struct HtfValidator {
    min_score: f64,
}

impl HtfValidator {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    /// 구조의 HTF 점수. `bias`가 없으면 캔들에서 계산합니다.
    pub fn score(&self, structure: &Structure, candles: &[Candle], bias: Option<HtfBias>) -> f64 {
        if candles.len() < HTF_MIN_CANDLES {
            return NEUTRAL_PASS_SCORE;
        }
        if structure.price <= Decimal::ZERO {
            return 0.0;
        }

        let bias = bias.unwrap_or_else(|| htf_bias(candles));

        proximity_score(structure.price, candles)
            + bias_score(structure.direction, bias)
            + age_score(structure.age)
            + STRENGTH_WEIGHT * structure.strength.clamp(0.0, 1.0)
    }

    /// 점수가 최소 기준 이상인지.
    pub fn is_admissible(
        &self,
        structure: &Structure,
        candles: &[Candle],
        bias: Option<HtfBias>,
    ) -> bool {
        self.score(structure, candles, bias) + SCORE_EPSILON >= self.min_score
    }

    /// 허용되는 구조만 남깁니다.
    pub fn filter(&self, mut structures: StructureSet, candles: &[Candle]) -> StructureSet {
        let bias = htf_bias(candles);
        let before = structures.len();

        structures.retain(|s| {
            let score = self.score(s, candles, Some(bias));
            let admitted = score + SCORE_EPSILON >= self.min_score;
            if !admitted {
                tracing::debug!(
                    kind = s.kind.label(),
                    price = %s.price,
                    score = score,
                    min_score = self.min_score,
                    "Structure rejected by HTF validation"
                );
            }
            admitted
        });

        tracing::debug!(
            before = before,
            after = structures.len(),
            bias = ?bias,
            "HTF validation applied"
        );
        structures
    }
}

fn proximity_score(price: Decimal, candles: &[Candle]) -> f64 {
    let upper = price * dec!(1.01);
    let lower = price * dec!(0.99);
    let start = candles.len().saturating_sub(PROXIMITY_BARS);

    let touched = candles[start..]
        .iter()
        .any(|c| c.low <= upper && c.high >= lower);
    if touched {
        PROXIMITY_WEIGHT
    } else {
        0.0
    }
}

fn bias_score(direction: StructureDirection, bias: HtfBias) -> f64 {
    match (direction, bias) {
        (_, HtfBias::Neutral) => BIAS_WEIGHT / 2.0,
        (StructureDirection::Bullish, HtfBias::Bullish)
        | (StructureDirection::Bearish, HtfBias::Bearish) => BIAS_WEIGHT,
        _ => 0.0,
    }
}

fn age_score(age: usize) -> f64 {
    match age {
        5..=50 => AGE_WEIGHT,
        1..=100 => AGE_WEIGHT / 2.0,
        _ => 0.0,
    }
}
