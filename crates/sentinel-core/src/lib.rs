//! # Sentinel Core
//!
//! 리스크 코어가 공유하는 기본 타입과 인프라를 제공합니다:
//! - 캔들, 거래 방향, 포지션 도메인 모델
//! - 심볼 사양과 pip 규칙
//! - 브로커 협력자 인터페이스와 모의 브로커
//! - 설정 로드
//! - 로깅 초기화

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
