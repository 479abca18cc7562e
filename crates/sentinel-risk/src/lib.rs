//! 리스크 제어 코어.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 시장 구조 탐지 (Order Block, Fair Value Gap, Break of Structure)
//! - 적응형 변동성 분류와 상위 타임프레임 검증
//! - 구조 기반 손절/목표 계산과 세션 조정
//! - 손익비 검증과 단계별 보정 (또는 거래 거부)
//! - 브로커 최소 거리 보정과 TP 분할
//! - 포지션 보호 (트레일링, 부분/전체 청산, 드로다운 차단)
//!
//! # 예제
//!
//! ```rust,ignore
//! use sentinel_risk::{RiskConfig, StopTargetRequest, TradeEvaluator};
//!
//! let evaluator = TradeEvaluator::try_new(&RiskConfig::default())?;
//! let request = StopTargetRequest::new(&spec, Side::Buy, entry, &candles, Utc::now());
//!
//! match evaluator.evaluate(&request) {
//!     Ok(plan) => submit(plan),
//!     Err(e) if e.is_veto() => tracing::warn!(reason = %e, "Trade vetoed"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

pub mod config;
pub mod error;
pub mod evaluator;
pub mod htf;
pub mod indicators;
pub mod levels;
pub mod protection;
pub mod rrr;
pub mod stop_target;
pub mod structure;
pub mod tp_split;
pub mod volatility;

// 주요 타입 재내보내기
pub use config::{
    ConfigValidationError, HtfConfig, ProtectionConfig, RiskConfig, RrrConfig,
    SessionAdjustConfig, StopTargetConfig, SymbolStopConfig, TpSplitConfig, TrailingConfig,
    VolatilityConfig,
};
pub use error::{RiskError, RiskResult};
pub use evaluator::{TradeEvaluator, TradePlan};
pub use htf::{htf_bias, HtfBias, HtfValidator};
pub use levels::{enforce_broker_min_stops, validate_levels, BrokerAdjustedLevels};
pub use protection::{
    DrawdownGuard, JsonFileStore, MemoryStore, ProtectionAction, ProtectionManager,
    ProtectionState, ProtectionStatus, StateStore, StoreError, TickReport, TrailingStopPlanner,
};
pub use rrr::{reward_risk_ratio, RepairRequest, RepairStep, RiskRewardValidator, ValidatedLevels};
pub use stop_target::{
    PostSessionContext, StopTargetCalculator, StopTargetRequest, StopTargetResult,
};
pub use structure::{
    Structure, StructureDetector, StructureDirection, StructureKind, StructureSet,
};
pub use tp_split::{price_at_ratio, TpLeg, TpSplitPlan, TpSplitPlanner};
pub use volatility::{Regime, VolatilityClassifier, VolatilityRegime};
