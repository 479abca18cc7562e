//! 애플리케이션 설정.
//!
//! 리스크 프리셋 위에 `config/default.toml`(또는 `--config`로 지정한 파일)과
//! `SENTINEL__SECTION__KEY` 환경 변수를 겹쳐서 읽습니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use sentinel_core::{load_layered_over, LoggingConfig, PersistenceConfig, DEFAULT_CONFIG_PATH};
use sentinel_risk::RiskConfig;

/// 전체 설정.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 상태 저장 설정
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// 리스크 설정
    #[serde(default)]
    pub risk: RiskConfig,
}

/// 리스크 설정 프리셋. 설정 파일과 환경 변수가 그 위에 덮어씁니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RiskPreset {
    /// 기본값
    #[default]
    Standard,
    /// 높은 손익비 요구, 이른 보호
    Conservative,
    /// 낮은 손익비 허용, 늦은 보호
    Aggressive,
}

impl RiskPreset {
    pub fn risk_config(self) -> RiskConfig {
        match self {
            RiskPreset::Standard => RiskConfig::default(),
            RiskPreset::Conservative => RiskConfig::conservative(),
            RiskPreset::Aggressive => RiskConfig::aggressive(),
        }
    }
}

impl AppConfig {
    /// 기본 프리셋으로 설정을 읽고 검증합니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_preset(path, RiskPreset::Standard)
    }

    /// 프리셋 위에 설정을 읽고 검증합니다.
    ///
    /// 경로를 주지 않으면 기본 설정 파일이 있을 때만 사용합니다.
    pub fn load_with_preset(path: Option<&Path>, preset: RiskPreset) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.exists().then_some(default)
            }
        };

        let defaults = AppConfig {
            risk: preset.risk_config(),
            ..AppConfig::default()
        };
        let config: AppConfig = load_layered_over(&defaults, path.as_deref())
            .with_context(|| match &path {
                Some(path) => format!("Failed to load config from {}", path.display()),
                None => "Failed to load config from environment".to_string(),
            })?;
        config.risk.validate().context("Invalid risk configuration")?;
        Ok(config)
    }

    /// 유효 설정을 TOML로 직렬화합니다.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
