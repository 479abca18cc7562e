//! 리스크 코어의 공통 에러 타입.
//!
//! 애플리케이션 경계(설정 로드, 입력 파일 파싱, 직렬화)에서 발생하는 에러를 정의합니다.
//! 알고리즘 단계의 에러는 `sentinel-risk`의 `RiskError`가 담당합니다.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum SentinelError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 데이터 에러 (캔들, 스냅샷 등)
    #[error("데이터 에러: {0}")]
    Data(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 파일 입출력 에러
    #[error("입출력 에러: {0}")]
    Io(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 코어 작업을 위한 Result 타입.
pub type SentinelResult<T> = Result<T, SentinelError>;

impl SentinelError {
    /// 사용자 입력을 고치면 해결되는 에러인지 확인합니다.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SentinelError::Config(_) | SentinelError::InvalidInput(_)
        )
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        SentinelError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SentinelError {
    fn from(err: std::io::Error) -> Self {
        SentinelError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for SentinelError {
    fn from(err: config::ConfigError) -> Self {
        SentinelError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_classification() {
        let config_err = SentinelError::Config("missing risk section".to_string());
        assert!(config_err.is_user_error());

        let io_err = SentinelError::Io("disk full".to_string());
        assert!(!io_err.is_user_error());
    }

    #[test]
    fn test_from_serde_json() {
        let err: SentinelError = serde_json::from_str::<u32>("not-a-number")
            .unwrap_err()
            .into();
        assert!(matches!(err, SentinelError::Serialization(_)));
    }
}
