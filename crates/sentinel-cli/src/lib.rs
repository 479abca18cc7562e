//! Sentinel CLI 도구 모음.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 거래 제안 평가 (캔들 파일 → 거래 계획 또는 거부)
//! - JSON 스냅샷 기반 보호 틱 드라이런
//! - 보호 상태 조회와 수동 세션 리셋
//! - 설정 로드와 유효 설정 출력

pub mod commands;
pub mod settings;

pub use settings::{AppConfig, RiskPreset};
