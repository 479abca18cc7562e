//! 브로커가 보고하는 오픈 포지션.
//!
//! 포지션의 식별자와 생명주기는 브로커가 소유합니다. 리스크 코어는 이 값을 읽기만 하고,
//! 청산/손절 변경은 ID를 참조하는 요청으로만 보냅니다.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Side;
use crate::types::{Price, Quantity};

/// 오픈 포지션 스냅샷.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// 브로커 포지션 ID (티켓)
    pub id: String,
    /// 심볼
    pub symbol: String,
    /// 방향
    pub side: Side,
    /// 현재 거래량 (lot)
    pub volume: Quantity,
    /// 진입 가격
    pub entry_price: Price,
    /// 현재 시장 가격
    pub current_price: Price,
    /// 현재 손절 가격
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Price>,
    /// 현재 목표 가격
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Price>,
    /// 진입 시각
    pub open_time: DateTime<Utc>,
    /// 미실현 손익 (계좌 통화)
    pub floating_profit: Decimal,
}

impl Position {
    /// 새 포지션 스냅샷을 생성합니다. 현재가는 진입가로 시작합니다.
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        volume: Quantity,
        entry_price: Price,
        open_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            side,
            volume,
            entry_price,
            current_price: entry_price,
            stop_loss: None,
            take_profit: None,
            open_time,
            floating_profit: Decimal::ZERO,
        }
    }

    /// 현재가와 미실현 손익을 설정합니다.
    pub fn with_market(mut self, current_price: Price, floating_profit: Decimal) -> Self {
        self.current_price = current_price;
        self.floating_profit = floating_profit;
        self
    }

    /// 손절 가격을 설정합니다.
    pub fn with_stop_loss(mut self, stop: Price) -> Self {
        self.stop_loss = Some(stop);
        self
    }

    /// 목표 가격을 설정합니다.
    pub fn with_take_profit(mut self, target: Price) -> Self {
        self.take_profit = Some(target);
        self
    }

    /// 수익 중인지 확인합니다.
    pub fn is_profitable(&self) -> bool {
        self.floating_profit > Decimal::ZERO
    }

    /// `now` 기준 보유 시간.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.open_time
    }
}
