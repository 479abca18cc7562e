//! tracing 기반 로깅 초기화.
//!
//! 리스크 코어는 라이브러리 전반에서 `tracing` 매크로로 구조화된 이벤트를 남기고,
//! 실행 파일은 이 모듈로 구독자를 한 번 설치합니다. 출력은 stderr로 보내
//! stdout의 JSON 결과와 섞이지 않습니다:
//! - **pretty**: 개발용 사람이 읽기 쉬운 형식
//! - **json**: 운영 로그 수집용 JSON 형식
//! - **compact**: 한 줄 형식

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// 레벨 필터를 읽는 환경 변수.
pub const LOG_LEVEL_ENV: &str = "SENTINEL_LOG";
/// 출력 형식을 읽는 환경 변수.
pub const LOG_FORMAT_ENV: &str = "SENTINEL_LOG_FORMAT";

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 색상이 포함된 사람이 읽기 쉬운 형식
    #[default]
    Pretty,
    /// JSON 형식
    Json,
    /// 간결한 한 줄 형식
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 레벨 필터 (예: "info", "sentinel_risk=debug")
    pub level: String,
    /// 출력 형식
    pub format: LogFormat,
    /// span 진입/종료 이벤트 포함 여부
    pub with_span_events: bool,
    /// 파일명과 줄 번호 포함 여부
    pub with_file: bool,
    /// 대상(모듈 경로) 포함 여부
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_span_events: false,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// 레벨만 지정한 설정을 생성합니다.
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// 로그 형식을 설정합니다.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// span 이벤트를 활성화합니다.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// 환경 변수로 설정을 덮어씁니다.
    ///
    /// `SENTINEL_LOG`가 없으면 `RUST_LOG`를 사용합니다.
    pub fn overridden_by_env(mut self) -> Self {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV).or_else(|_| std::env::var("RUST_LOG")) {
            self.level = level;
        }
        if let Some(format) = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.format = format;
        }
        self
    }

    /// 환경 변수만으로 설정을 생성합니다.
    pub fn from_env() -> Self {
        Self::default().overridden_by_env()
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: config.format.parse().unwrap_or_default(),
            with_span_events: config.span_events,
            ..Default::default()
        }
    }
}

/// 전역 구독자를 설치합니다.
///
/// 이미 설치되어 있으면 에러를 반환합니다.
///
/// # 예제
///
/// ```no_run
/// use sentinel_core::logging::{init_logging, LogConfig, LogFormat};
///
/// init_logging(LogConfig::new("debug").with_format(LogFormat::Json)).unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_new(&config.level)?;

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .with_span_events(span_events)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .with_span_events(span_events)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .with_span_events(span_events)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    tracing::debug!(
        format = ?config.format,
        level = %config.level,
        "Logging initialized"
    );

    Ok(())
}

/// 진입 평가 span. 심볼과 방향을 필드로 가집니다.
#[macro_export]
macro_rules! evaluation_span {
    ($name:expr, $symbol:expr, $side:expr) => {
        tracing::info_span!($name, symbol = %$symbol, side = %$side)
    };
}

/// 보호 틱 span. 포지션 ID와 심볼을 선택적으로 가집니다.
#[macro_export]
macro_rules! protection_span {
    ($name:expr) => {
        tracing::info_span!($name)
    };
    ($name:expr, $position_id:expr, $symbol:expr) => {
        tracing::info_span!($name, position_id = %$position_id, symbol = %$symbol)
    };
}
