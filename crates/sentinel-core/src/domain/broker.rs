//! 브로커 협력자 인터페이스.
//!
//! 터미널 연결, 주문 전송, 캔들 조회는 외부 구성요소가 담당합니다.
//! 리스크 코어는 이 trait를 통해서만 스냅샷을 읽고 변경 요청을 보냅니다.
//! 호출은 동기 요청/응답이며 타임아웃은 구현체가 책임집니다.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{Candle, Position};
use crate::types::{Price, Quantity, SymbolSpec, Timeframe};

// =============================================================================
// 에러 타입
// =============================================================================

/// 브로커 호출 에러.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrokerError {
    /// 브로커가 요청을 거부함
    #[error("요청 거부: {0}")]
    Rejected(String),

    /// 포지션/심볼을 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 터미널 연결 불가 또는 타임아웃
    #[error("브로커 사용 불가: {0}")]
    Unavailable(String),

    /// 심볼 정보 조회 실패
    #[error("심볼 정보 에러: {0}")]
    SymbolInfo(String),

    /// 기타 에러
    #[error("기타 에러: {0}")]
    Other(String),
}

impl BrokerError {
    /// 다음 틱에서 재시도하면 성공할 수 있는 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_) | BrokerError::Rejected(_))
    }
}

// =============================================================================
// BrokerGateway Trait
// =============================================================================

/// 브로커 협력자 trait.
///
/// # 구현 예시
///
/// ```ignore
/// struct TerminalBroker { /* ... */ }
///
/// impl BrokerGateway for TerminalBroker {
///     fn open_positions(&self) -> Result<Vec<Position>, BrokerError> {
///         // 터미널 조회 결과 변환
///     }
///     // ... 나머지 메서드 구현
/// }
/// ```
pub trait BrokerGateway {
    /// 현재 오픈 포지션 목록.
    fn open_positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// 계좌 평가금액 (잔고 + 미실현 손익).
    fn account_equity(&self) -> Result<Decimal, BrokerError>;

    /// 계좌 잔고.
    fn account_balance(&self) -> Result<Decimal, BrokerError>;

    /// 심볼 사양.
    fn symbol_spec(&self, symbol: &str) -> Result<SymbolSpec, BrokerError>;

    /// 심볼의 pip 크기.
    fn pip_size(&self, symbol: &str) -> Result<Price, BrokerError> {
        Ok(self.symbol_spec(symbol)?.pip_size)
    }

    /// 브로커 최소 손절 거리 (가격 단위).
    fn min_stop_distance(&self, symbol: &str) -> Result<Price, BrokerError> {
        Ok(self.symbol_spec(symbol)?.min_stop_distance)
    }

    /// 포지션의 `volume` 만큼을 청산합니다.
    fn close_position(&mut self, position_id: &str, volume: Quantity) -> Result<(), BrokerError>;

    /// 포지션의 손절 가격을 변경합니다.
    fn modify_stop(&mut self, position_id: &str, new_stop: Price) -> Result<(), BrokerError>;

    /// 최근 `count`개의 완성된 캔들 (오래된 것부터).
    fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError>;

    /// 로깅용 브로커 이름.
    fn broker_name(&self) -> &str {
        "broker"
    }
}
