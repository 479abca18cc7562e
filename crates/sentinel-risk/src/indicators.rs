//! 변동성/추세 보조 지표.
//!
//! - True Range
//! - ATR (True Range의 단순 이동평균)
//! - SMA

use rust_decimal::Decimal;
use sentinel_core::Candle;

use crate::error::{RiskError, RiskResult};

/// 캔들별 True Range.
///
/// 첫 캔들은 이전 종가가 없으므로 고가 - 저가입니다.
pub fn true_range(candles: &[Candle]) -> Vec<Decimal> {
    let mut ranges = Vec::with_capacity(candles.len());

    for (i, candle) in candles.iter().enumerate() {
        let hl = candle.high - candle.low;
        if i == 0 {
            ranges.push(hl);
            continue;
        }
        let prev_close = candles[i - 1].close;
        let hc = (candle.high - prev_close).abs();
        let lc = (candle.low - prev_close).abs();
        ranges.push(hl.max(hc).max(lc));
    }

    ranges
}

/// 단순 이동평균. 기간이 채워지기 전의 값은 `None`입니다.
pub fn sma(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let divisor = Decimal::from(period);
    let mut result = Vec::with_capacity(values.len());
    let mut window_sum = Decimal::ZERO;

    for (i, value) in values.iter().enumerate() {
        window_sum += *value;
        if i >= period {
            window_sum -= values[i - period];
        }
        if i + 1 >= period {
            result.push(Some(window_sum / divisor));
        } else {
            result.push(None);
        }
    }

    result
}

/// ATR 시계열 (True Range의 `period` 이동평균).
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<Decimal>> {
    sma(&true_range(candles), period)
}

/// 가장 최근 ATR 값.
pub fn latest_atr(candles: &[Candle], period: usize) -> RiskResult<Decimal> {
    if period == 0 || candles.len() < period {
        return Err(RiskError::InsufficientData {
            required: period.max(1),
            provided: candles.len(),
        });
    }

    atr_series(candles, period)
        .last()
        .copied()
        .flatten()
        .ok_or(RiskError::InsufficientData {
            required: period,
            provided: candles.len(),
        })
}
