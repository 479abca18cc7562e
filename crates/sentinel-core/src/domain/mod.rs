//! 도메인 모델.
//!
//! - `Candle` - OHLCV 캔들
//! - `Side` - 거래 방향과 방향별 가격 기하
//! - `Position` - 브로커가 보고하는 오픈 포지션
//! - `BrokerGateway` - 브로커 협력자 인터페이스
//! - `PaperBroker` - 메모리 기반 모의 브로커

mod broker;
mod candle;
mod paper;
mod position;
mod side;

pub use broker::*;
pub use candle::*;
pub use paper::*;
pub use position::*;
pub use side::*;
