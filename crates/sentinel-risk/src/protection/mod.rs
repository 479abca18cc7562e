//! 포지션 보호.
//!
//! - `ProtectionManager` - 틱 기반 2단계 보호 상태 머신
//! - `ProtectionState` - 세션 단위로 영속화되는 상태
//! - `StateStore` - 상태 저장소 (JSON 파일, 메모리)
//! - `DrawdownGuard` - 드로다운 차단 히스테리시스
//! - `TrailingStopPlanner` - 보유 시간 기반 트레일링 손절

mod drawdown;
mod manager;
mod state;
mod store;
mod trailing;

pub use drawdown::{DrawdownGuard, DrawdownTransition};
pub use manager::{ProtectionAction, ProtectionManager, ProtectionStatus, TickReport};
pub use state::{PartialProgress, ProtectionState, TrailingRecord};
pub use store::{JsonFileStore, MemoryStore, StateStore, StoreError};
pub use trailing::{TrailingMode, TrailingStopPlanner};
