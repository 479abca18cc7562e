//! 가격 구조 탐지.
//!
//! 캔들 구간에서 세 종류의 구조 레벨을 추출합니다:
//! - **오더 블록 (OB)**: 양쪽 이웃보다 극값이 더 나간 뒤 되돌려진 캔들
//! - **페어 밸류 갭 (FVG)**: 1번 캔들과 3번 캔들이 겹치지 않는 3캔들 공백
//! - **구조 돌파 (BOS)**: 현재 캔들이 넘어선 3캔들 중심 스윙 극값
//!
//! 손절/목표 선택은 항상 "진입가에 가장 가까운 허용 구조"이며,
//! 거리가 같으면 OB, FVG, BOS 순서를 따릅니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{Candle, DecimalExt, Price, Side};

/// FVG와 BOS에 부여하는 중립 강도.
pub const NEUTRAL_STRENGTH: f64 = 0.5;

/// 구조 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    /// 오더 블록
    OrderBlock,
    /// 페어 밸류 갭
    FairValueGap,
    /// 구조 돌파
    BreakOfStructure,
}

impl StructureKind {
    /// 출처 문자열에 쓰는 이름.
    pub fn label(&self) -> &'static str {
        match self {
            StructureKind::OrderBlock => "order block",
            StructureKind::FairValueGap => "fair value gap",
            StructureKind::BreakOfStructure => "break of structure",
        }
    }
}

/// 구조 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureDirection {
    /// 상승 구조
    Bullish,
    /// 하락 구조
    Bearish,
}

impl StructureDirection {
    /// 거래 방향과 같은 쪽의 구조 방향.
    pub fn aligned_with(side: Side) -> Self {
        match side {
            Side::Buy => StructureDirection::Bullish,
            Side::Sell => StructureDirection::Bearish,
        }
    }
}

/// 탐지된 구조 레벨.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// 종류
    pub kind: StructureKind,
    /// 방향
    pub direction: StructureDirection,
    /// 기준 가격
    pub price: Price,
    /// 강도 (0~1)
    pub strength: f64,
    /// 형성 후 경과 캔들 수
    pub age: usize,
    /// FVG 폭 (그 외 0)
    pub width: Price,
    /// 탐지 구간 내 인덱스
    pub index: usize,
}

impl Structure {
    fn new(
        kind: StructureKind,
        direction: StructureDirection,
        price: Price,
        strength: f64,
        age: usize,
        index: usize,
    ) -> Self {
        Self {
            kind,
            direction,
            price,
            strength: strength.clamp(0.0, 1.0),
            age,
            width: Decimal::ZERO,
            index,
        }
    }

    fn with_width(mut self, width: Price) -> Self {
        self.width = width;
        self
    }

    /// 진입가까지의 절대 거리.
    pub fn distance_from(&self, entry: Price) -> Decimal {
        (self.price - entry).abs()
    }

    /// 이 거래 방향의 손절 기준으로 쓸 수 있는지 (반대 방향, 진입가 뒤).
    pub fn is_stop_candidate(&self, entry: Price, side: Side) -> bool {
        self.direction != StructureDirection::aligned_with(side) && side.is_behind(entry, self.price)
    }

    /// 이 거래 방향의 목표 기준으로 쓸 수 있는지 (같은 방향, 진입가 앞).
    pub fn is_target_candidate(&self, entry: Price, side: Side) -> bool {
        self.direction == StructureDirection::aligned_with(side) && side.is_ahead(entry, self.price)
    }
}

/// 한 번의 탐지 결과.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureSet {
    /// 오더 블록
    pub order_blocks: Vec<Structure>,
    /// 페어 밸류 갭
    pub fair_value_gaps: Vec<Structure>,
    /// 구조 돌파
    pub breaks: Vec<Structure>,
}

impl StructureSet {
    /// 구조가 하나도 없는지.
    pub fn is_empty(&self) -> bool {
        self.order_blocks.is_empty() && self.fair_value_gaps.is_empty() && self.breaks.is_empty()
    }

    /// 전체 구조 수.
    pub fn len(&self) -> usize {
        self.order_blocks.len() + self.fair_value_gaps.len() + self.breaks.len()
    }

    /// OB, FVG, BOS 순서로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &Structure> {
        self.order_blocks
            .iter()
            .chain(self.fair_value_gaps.iter())
            .chain(self.breaks.iter())
    }

    /// 조건을 만족하는 구조만 남깁니다.
    pub fn retain(&mut self, mut keep: impl FnMut(&Structure) -> bool) {
        self.order_blocks.retain(&mut keep);
        self.fair_value_gaps.retain(&mut keep);
        self.breaks.retain(&mut keep);
    }

    /// 손절 후보를 가까운 순서로 반환합니다.
    pub fn stop_candidates(&self, entry: Price, side: Side) -> Vec<&Structure> {
        self.nearest_first(entry, |s| s.is_stop_candidate(entry, side))
    }

    /// 목표 후보를 가까운 순서로 반환합니다.
    pub fn target_candidates(&self, entry: Price, side: Side) -> Vec<&Structure> {
        self.nearest_first(entry, |s| s.is_target_candidate(entry, side))
    }

    /// 가장 가까운 손절 후보.
    pub fn nearest_stop(&self, entry: Price, side: Side) -> Option<&Structure> {
        self.stop_candidates(entry, side).into_iter().next()
    }

    /// 가장 가까운 목표 후보.
    pub fn nearest_target(&self, entry: Price, side: Side) -> Option<&Structure> {
        self.target_candidates(entry, side).into_iter().next()
    }

    fn nearest_first(
        &self,
        entry: Price,
        admissible: impl Fn(&Structure) -> bool,
    ) -> Vec<&Structure> {
        let mut candidates: Vec<&Structure> = self.iter().filter(|s| admissible(s)).collect();
        // 안정 정렬이므로 거리가 같으면 OB, FVG, BOS 순서가 유지됩니다
        candidates.sort_by_key(|s| s.distance_from(entry));
        candidates
    }
}

/// 구조 탐지기.
#[derive(Debug, Clone)]
pub struct StructureDetector {
    lookback: usize,
}

impl Default for StructureDetector {
    fn default() -> Self {
        Self::new(20)
    }
}

impl StructureDetector {
    /// 탐지 구간 길이로 탐지기를 생성합니다.
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(3),
        }
    }

    /// 탐지 구간 길이.
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// 최근 `lookback`개 캔들에서 구조를 탐지합니다.
    ///
    /// 캔들이 `lookback`보다 적으면 빈 결과를 반환합니다.
    pub fn detect(&self, candles: &[Candle]) -> StructureSet {
        if candles.len() < self.lookback {
            tracing::debug!(
                candles = candles.len(),
                lookback = self.lookback,
                "Not enough candles for structure detection"
            );
            return StructureSet::default();
        }

        let window = &candles[candles.len() - self.lookback..];
        let set = StructureSet {
            order_blocks: Self::order_blocks(window),
            fair_value_gaps: Self::fair_value_gaps(window),
            breaks: Self::breaks_of_structure(window),
        };

        tracing::debug!(
            order_blocks = set.order_blocks.len(),
            fair_value_gaps = set.fair_value_gaps.len(),
            breaks = set.breaks.len(),
            "Structures detected"
        );
        set
    }

    fn order_blocks(window: &[Candle]) -> Vec<Structure> {
        let n = window.len();
        let mut blocks = Vec::new();

        for i in 1..n - 1 {
            let (prev, current, next) = (&window[i - 1], &window[i], &window[i + 1]);
            let strength = if current.open.is_zero() {
                0.0
            } else {
                (current.body_size() / current.open).to_f64_lossy()
            };
            let age = n - 1 - i;

            // 저점이 양쪽보다 낮고 양봉으로 되돌림 → 상승 OB
            if current.low < prev.low && current.low < next.low && current.is_bullish() {
                blocks.push(Structure::new(
                    StructureKind::OrderBlock,
                    StructureDirection::Bullish,
                    current.low,
                    strength,
                    age,
                    i,
                ));
            }

            // 고점이 양쪽보다 높고 음봉으로 되돌림 → 하락 OB
            if current.high > prev.high && current.high > next.high && current.is_bearish() {
                blocks.push(Structure::new(
                    StructureKind::OrderBlock,
                    StructureDirection::Bearish,
                    current.high,
                    strength,
                    age,
                    i,
                ));
            }
        }

        blocks
    }

    fn fair_value_gaps(window: &[Candle]) -> Vec<Structure> {
        let n = window.len();
        let two = Decimal::TWO;
        let mut gaps = Vec::new();

        for i in 1..n - 1 {
            let (first, third) = (&window[i - 1], &window[i + 1]);
            // 갭은 세 번째 캔들에서 완성됩니다
            let age = n - 2 - i;

            if first.high < third.low {
                gaps.push(
                    Structure::new(
                        StructureKind::FairValueGap,
                        StructureDirection::Bullish,
                        (first.high + third.low) / two,
                        NEUTRAL_STRENGTH,
                        age,
                        i,
                    )
                    .with_width(third.low - first.high),
                );
            } else if first.low > third.high {
                gaps.push(
                    Structure::new(
                        StructureKind::FairValueGap,
                        StructureDirection::Bearish,
                        (first.low + third.high) / two,
                        NEUTRAL_STRENGTH,
                        age,
                        i,
                    )
                    .with_width(first.low - third.high),
                );
            }
        }

        gaps
    }

    fn breaks_of_structure(window: &[Candle]) -> Vec<Structure> {
        let n = window.len();
        let current = &window[n - 1];
        let mut breaks = Vec::new();

        for i in 1..n - 1 {
            let (prev, swing, next) = (&window[i - 1], &window[i], &window[i + 1]);
            let age = n - 1 - i;

            let is_swing_high = swing.high >= prev.high && swing.high >= next.high;
            if is_swing_high && current.high > swing.high {
                breaks.push(Structure::new(
                    StructureKind::BreakOfStructure,
                    StructureDirection::Bullish,
                    swing.high,
                    NEUTRAL_STRENGTH,
                    age,
                    i,
                ));
            }

            let is_swing_low = swing.low <= prev.low && swing.low <= next.low;
            if is_swing_low && current.low < swing.low {
                breaks.push(Structure::new(
                    StructureKind::BreakOfStructure,
                    StructureDirection::Bearish,
                    swing.low,
                    NEUTRAL_STRENGTH,
                    age,
                    i,
                ));
            }
        }

        breaks
    }
}
