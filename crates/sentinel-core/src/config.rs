//! 설정 로드.
//!
//! 설정은 TOML 파일과 `SENTINEL__SECTION__KEY` 형태의 환경 변수를 겹쳐서 읽습니다.
//! 각 섹션의 타입은 해당 기능을 가진 crate가 정의하고, 이 모듈은 공통 섹션과
//! 로더만 제공합니다.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SentinelResult;

/// 환경 변수 접두사.
pub const ENV_PREFIX: &str = "SENTINEL";

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨 필터
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// span 진입/종료 이벤트 기록 여부
    #[serde(default)]
    pub span_events: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            span_events: false,
        }
    }
}

/// 보호 상태 저장 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// 보호 상태 JSON 파일 경로
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state/protection_state.json")
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

/// 파일과 환경 변수를 겹쳐서 설정을 읽습니다.
///
/// `path`가 주어지면 파일이 반드시 존재해야 합니다. 파일 없이 호출하면
/// 타입의 serde 기본값과 환경 변수만 사용합니다.
pub fn load_layered<T: DeserializeOwned>(path: Option<&Path>) -> SentinelResult<T> {
    layered(config::Config::builder(), path)
}

/// `defaults` 위에 파일과 환경 변수를 겹쳐서 설정을 읽습니다.
///
/// 파일이나 환경 변수에 없는 값은 serde 기본값 대신 `defaults`의 값을 씁니다.
pub fn load_layered_over<T: Serialize + DeserializeOwned>(
    defaults: &T,
    path: Option<&Path>,
) -> SentinelResult<T> {
    let base = config::Config::try_from(defaults)?;
    layered(config::Config::builder().add_source(base), path)
}

fn layered<T: DeserializeOwned>(
    mut builder: config::ConfigBuilder<config::builder::DefaultState>,
    path: Option<&Path>,
) -> SentinelResult<T> {
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
