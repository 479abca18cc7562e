//! 리스크 코어 설정.
//!
//! 손절/목표 계산, 변동성 분류, 상위 타임프레임 검증, 손익비 보정, TP 분할,
//! 포지션 보호를 위한 설정 구조체를 정의합니다. 모든 필드는 serde 기본값을 가지므로
//! 설정 파일에는 바꾸려는 값만 적으면 됩니다.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use sentinel_core::Timeframe;

/// 전역 리스크 설정.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    /// 손절/목표 계산 설정
    #[serde(default)]
    pub stop_target: StopTargetConfig,
    /// 적응형 변동성 분류 설정
    #[serde(default)]
    pub volatility: VolatilityConfig,
    /// 상위 타임프레임 검증 설정
    #[serde(default)]
    pub htf: HtfConfig,
    /// 손익비 검증/보정 설정
    #[serde(default)]
    pub rrr: RrrConfig,
    /// TP 분할 설정
    #[serde(default)]
    pub tp_split: TpSplitConfig,
    /// 포지션 보호 설정
    #[serde(default)]
    pub protection: ProtectionConfig,
}

// =============================================================================
// 손절/목표 계산
// =============================================================================

/// 손절/목표 계산 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTargetConfig {
    /// 기본 손절 거리 (pip, 기본값: 50)
    #[serde(default = "default_sl_pips")]
    pub sl_pips: Decimal,

    /// 기본 목표 거리 (pip, 기본값: 100)
    #[serde(default = "default_tp_pips")]
    pub tp_pips: Decimal,

    /// 구조 탐지에 사용할 캔들 수 (기본값: 20)
    /// 이보다 적은 캔들이 주어지면 설정 거리로 대체합니다
    #[serde(default = "default_structure_lookback")]
    pub structure_lookback: usize,

    /// ATR 기간 (기본값: 14)
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// 구조 손절 버퍼의 ATR 비율 (기본값: 0.25)
    #[serde(default = "default_buffer_atr_fraction")]
    pub buffer_atr_fraction: f64,

    /// 구조 손절 버퍼 상한 (pip, 기본값: 10)
    #[serde(default = "default_buffer_max_pips")]
    pub buffer_max_pips: Decimal,

    /// 시간대별 목표 조정
    #[serde(default)]
    pub session: SessionAdjustConfig,

    /// 심볼별 거리 설정 (전역 설정을 재정의함)
    #[serde(default)]
    pub symbol_configs: HashMap<String, SymbolStopConfig>,
}

/// 심볼별 손절/목표 거리.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolStopConfig {
    /// 이 심볼의 손절 거리 (pip)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_pips: Option<Decimal>,

    /// 이 심볼의 목표 거리 (pip)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_pips: Option<Decimal>,
}

/// 시간대별 목표 조정 설정. 시각은 모두 UTC입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAdjustConfig {
    /// 압축 활성화 여부 (기본값: true)
    #[serde(default = "default_true")]
    pub compress_enabled: bool,

    /// 이 시각 이후 목표를 손절 거리의 배수로 압축 (기본값: 15:30)
    #[serde(default = "default_compress_after", with = "hhmm")]
    pub compress_after_utc: NaiveTime,

    /// 압축 손익비 (기본값: 1.2)
    #[serde(default = "default_compress_rrr")]
    pub compress_rrr: f64,

    /// 세션 후 잔고 비율 목표 사용 여부 (기본값: false)
    #[serde(default)]
    pub post_session_target_enabled: bool,

    /// 세션 후 구간 시작 (기본값: 17:00)
    #[serde(default = "default_post_session_start", with = "hhmm")]
    pub post_session_start_utc: NaiveTime,

    /// 세션 후 구간 종료 (기본값: 19:00)
    #[serde(default = "default_post_session_end", with = "hhmm")]
    pub post_session_end_utc: NaiveTime,

    /// 세션 후 목표 수익 (잔고 대비 %, 기본값: 1.5)
    #[serde(default = "default_post_session_target_pct")]
    pub post_session_target_pct: f64,
}

// =============================================================================
// 변동성 / 상위 타임프레임
// =============================================================================

/// 적응형 변동성 분류 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// 백분위 분류 사용 여부 (false면 항상 중간 배수, 기본값: true)
    #[serde(default = "default_true")]
    pub adaptive: bool,

    /// 백분위 계산 구간 (기본값: 90)
    #[serde(default = "default_volatility_lookback")]
    pub lookback: usize,

    /// 하위 백분위 기준 (기본값: 0.3)
    #[serde(default = "default_low_percentile")]
    pub low_percentile: f64,

    /// 상위 백분위 기준 (기본값: 0.7)
    #[serde(default = "default_high_percentile")]
    pub high_percentile: f64,

    /// 저변동성 배수 (기본값: 1.2)
    #[serde(default = "default_low_multiplier")]
    pub low_multiplier: f64,

    /// 중간 변동성 배수 (기본값: 1.5)
    #[serde(default = "default_mid_multiplier")]
    pub mid_multiplier: f64,

    /// 고변동성 배수 (기본값: 1.8)
    #[serde(default = "default_high_multiplier")]
    pub high_multiplier: f64,
}

/// 상위 타임프레임 검증 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtfConfig {
    /// 검증 사용 여부 (기본값: false)
    #[serde(default)]
    pub enabled: bool,

    /// 상위 타임프레임 (기본값: H1)
    #[serde(default = "default_htf_timeframe")]
    pub timeframe: Timeframe,

    /// 가져올 상위 타임프레임 캔들 수 (기본값: 100)
    #[serde(default = "default_htf_candle_count")]
    pub candle_count: usize,

    /// 허용 최소 점수 (기본값: 0.6)
    #[serde(default = "default_htf_min_score")]
    pub min_score: f64,
}

// =============================================================================
// 손익비 / TP 분할
// =============================================================================

/// 손익비 검증/보정 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RrrConfig {
    /// 최소 손익비 (기본값: 1.5)
    #[serde(default = "default_min_rrr")]
    pub min_rrr: f64,

    /// 손절 거리 상한 (ATR 배수, 기본값: 2.5)
    #[serde(default = "default_max_sl_atr_multiple")]
    pub max_sl_atr_multiple: f64,

    /// 목표 거리 하한 (pip, 기본값: 15)
    #[serde(default = "default_min_tp_pips")]
    pub min_tp_pips: Decimal,

    /// 목표 거리 상한 (pip, 기본값: 500)
    #[serde(default = "default_max_tp_pips")]
    pub max_tp_pips: Decimal,

    /// ATR 기반 대체 목표 허용 (기본값: true)
    #[serde(default = "default_true")]
    pub allow_atr_fallback: bool,

    /// 보정 시도 여부 (false면 미달 즉시 거부, 기본값: true)
    #[serde(default = "default_true")]
    pub enable_repair: bool,
}

/// TP 분할 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpSplitConfig {
    /// 분할 사용 여부 (기본값: false)
    #[serde(default)]
    pub enabled: bool,

    /// 1차 목표 손익비 (기본값: 1.0)
    #[serde(default = "default_tp1_ratio")]
    pub tp1_ratio: f64,

    /// 1차 목표 비중 (기본값: 0.3)
    #[serde(default = "default_tp1_size")]
    pub tp1_size: f64,

    /// 2차 목표 손익비 (기본값: 2.0)
    #[serde(default = "default_tp2_ratio")]
    pub tp2_ratio: f64,

    /// 2차 목표 비중 (기본값: 0.7)
    #[serde(default = "default_tp2_size")]
    pub tp2_size: f64,
}

// =============================================================================
// 포지션 보호
// =============================================================================

/// 포지션 보호 설정. 퍼센트는 모두 세션 기준 평가금액 대비입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionConfig {
    /// 부분 청산 트리거 (기본값: +1.0%)
    #[serde(default = "default_partial_close_pct")]
    pub partial_close_pct: f64,

    /// 전체 청산 트리거 (기본값: +2.0%)
    #[serde(default = "default_full_close_pct")]
    pub full_close_pct: f64,

    /// 드로다운 차단 기준 (기본값: -0.5%)
    #[serde(default = "default_drawdown_block_pct")]
    pub drawdown_block_pct: f64,

    /// 차단 해제 기준 (기본값: 0.0%), 차단 기준보다 높아야 합니다
    #[serde(default = "default_unblock_pct")]
    pub unblock_pct: f64,

    /// 세션 리셋 허용 오차 (기본값: 0.1%)
    #[serde(default = "default_cycle_epsilon_pct")]
    pub cycle_epsilon_pct: f64,

    /// 세션 종료 시각 (UTC, 기본값: 21:00)
    #[serde(default = "default_session_end", with = "hhmm")]
    pub session_end_utc: NaiveTime,

    /// 부분 청산 비율 (기본값: 0.5)
    #[serde(default = "default_partial_close_fraction")]
    pub partial_close_fraction: f64,

    /// 본전 손절 안전 tick 수 (기본값: 2)
    #[serde(default = "default_breakeven_tick_safety")]
    pub breakeven_tick_safety: u32,

    /// 트레일링 설정
    #[serde(default)]
    pub trailing: TrailingConfig,
}

/// 트레일링 손절 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// 트레일링 활성화까지 보유 시간 (초, 기본값: 1800)
    #[serde(default = "default_trailing_activate_secs")]
    pub activate_after_secs: i64,

    /// ATR 기반 거리 사용 여부 (false면 고정 pip, 기본값: true)
    #[serde(default = "default_true")]
    pub use_atr: bool,

    /// 트레일링 ATR 기간 (기본값: 14)
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// 트레일링 ATR 배수 (기본값: 1.5)
    #[serde(default = "default_trail_atr_multiplier")]
    pub atr_multiplier: f64,

    /// 고정 트레일링 거리 (pip, 기본값: 20)
    #[serde(default = "default_trail_fixed_pips")]
    pub fixed_pips: Decimal,

    /// ATR 계산용 타임프레임 (기본값: M15)
    #[serde(default = "default_trail_timeframe")]
    pub timeframe: Timeframe,
}

// 기본값 함수들
fn default_true() -> bool {
    true
}

fn default_sl_pips() -> Decimal {
    dec!(50)
}

fn default_tp_pips() -> Decimal {
    dec!(100)
}

fn default_structure_lookback() -> usize {
    20
}

fn default_atr_period() -> usize {
    14
}

fn default_buffer_atr_fraction() -> f64 {
    0.25
}

fn default_buffer_max_pips() -> Decimal {
    dec!(10)
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn default_compress_after() -> NaiveTime {
    hm(15, 30)
}

fn default_compress_rrr() -> f64 {
    1.2
}

fn default_post_session_start() -> NaiveTime {
    hm(17, 0)
}

fn default_post_session_end() -> NaiveTime {
    hm(19, 0)
}

fn default_post_session_target_pct() -> f64 {
    1.5
}

fn default_volatility_lookback() -> usize {
    90
}

fn default_low_percentile() -> f64 {
    0.3
}

fn default_high_percentile() -> f64 {
    0.7
}

fn default_low_multiplier() -> f64 {
    1.2
}

fn default_mid_multiplier() -> f64 {
    1.5
}

fn default_high_multiplier() -> f64 {
    1.8
}

fn default_htf_timeframe() -> Timeframe {
    Timeframe::H1
}

fn default_htf_candle_count() -> usize {
    100
}

fn default_htf_min_score() -> f64 {
    0.6
}

fn default_min_rrr() -> f64 {
    1.5
}

fn default_max_sl_atr_multiple() -> f64 {
    2.5
}

fn default_min_tp_pips() -> Decimal {
    dec!(15)
}

fn default_max_tp_pips() -> Decimal {
    dec!(500)
}

fn default_tp1_ratio() -> f64 {
    1.0
}

fn default_tp1_size() -> f64 {
    0.3
}

fn default_tp2_ratio() -> f64 {
    2.0
}

fn default_tp2_size() -> f64 {
    0.7
}

fn default_partial_close_pct() -> f64 {
    1.0
}

fn default_full_close_pct() -> f64 {
    2.0
}

fn default_drawdown_block_pct() -> f64 {
    -0.5
}

fn default_unblock_pct() -> f64 {
    0.0
}

fn default_cycle_epsilon_pct() -> f64 {
    0.1
}

fn default_session_end() -> NaiveTime {
    hm(21, 0)
}

fn default_partial_close_fraction() -> f64 {
    0.5
}

fn default_breakeven_tick_safety() -> u32 {
    2
}

fn default_trailing_activate_secs() -> i64 {
    1800
}

fn default_trail_atr_multiplier() -> f64 {
    1.5
}

fn default_trail_fixed_pips() -> Decimal {
    dec!(20)
}

fn default_trail_timeframe() -> Timeframe {
    Timeframe::M15
}

impl Default for StopTargetConfig {
    fn default() -> Self {
        Self {
            sl_pips: default_sl_pips(),
            tp_pips: default_tp_pips(),
            structure_lookback: default_structure_lookback(),
            atr_period: default_atr_period(),
            buffer_atr_fraction: default_buffer_atr_fraction(),
            buffer_max_pips: default_buffer_max_pips(),
            session: SessionAdjustConfig::default(),
            symbol_configs: HashMap::new(),
        }
    }
}

impl Default for SessionAdjustConfig {
    fn default() -> Self {
        Self {
            compress_enabled: true,
            compress_after_utc: default_compress_after(),
            compress_rrr: default_compress_rrr(),
            post_session_target_enabled: false,
            post_session_start_utc: default_post_session_start(),
            post_session_end_utc: default_post_session_end(),
            post_session_target_pct: default_post_session_target_pct(),
        }
    }
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            lookback: default_volatility_lookback(),
            low_percentile: default_low_percentile(),
            high_percentile: default_high_percentile(),
            low_multiplier: default_low_multiplier(),
            mid_multiplier: default_mid_multiplier(),
            high_multiplier: default_high_multiplier(),
        }
    }
}

impl Default for HtfConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeframe: default_htf_timeframe(),
            candle_count: default_htf_candle_count(),
            min_score: default_htf_min_score(),
        }
    }
}

impl Default for RrrConfig {
    fn default() -> Self {
        Self {
            min_rrr: default_min_rrr(),
            max_sl_atr_multiple: default_max_sl_atr_multiple(),
            min_tp_pips: default_min_tp_pips(),
            max_tp_pips: default_max_tp_pips(),
            allow_atr_fallback: true,
            enable_repair: true,
        }
    }
}

impl Default for TpSplitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tp1_ratio: default_tp1_ratio(),
            tp1_size: default_tp1_size(),
            tp2_ratio: default_tp2_ratio(),
            tp2_size: default_tp2_size(),
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            partial_close_pct: default_partial_close_pct(),
            full_close_pct: default_full_close_pct(),
            drawdown_block_pct: default_drawdown_block_pct(),
            unblock_pct: default_unblock_pct(),
            cycle_epsilon_pct: default_cycle_epsilon_pct(),
            session_end_utc: default_session_end(),
            partial_close_fraction: default_partial_close_fraction(),
            breakeven_tick_safety: default_breakeven_tick_safety(),
            trailing: TrailingConfig::default(),
        }
    }
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            activate_after_secs: default_trailing_activate_secs(),
            use_atr: true,
            atr_period: default_atr_period(),
            atr_multiplier: default_trail_atr_multiplier(),
            fixed_pips: default_trail_fixed_pips(),
            timeframe: default_trail_timeframe(),
        }
    }
}

impl StopTargetConfig {
    /// 심볼의 유효 손절 거리 (pip).
    /// 심볼별 값이 있으면 그 값을, 없으면 전역 기본값을 반환합니다.
    pub fn sl_pips_for(&self, symbol: &str) -> Decimal {
        self.symbol_configs
            .get(symbol)
            .and_then(|c| c.sl_pips)
            .unwrap_or(self.sl_pips)
    }

    /// 심볼의 유효 목표 거리 (pip).
    pub fn tp_pips_for(&self, symbol: &str) -> Decimal {
        self.symbol_configs
            .get(symbol)
            .and_then(|c| c.tp_pips)
            .unwrap_or(self.tp_pips)
    }

    /// 심볼별 설정을 추가하거나 업데이트합니다.
    pub fn set_symbol_config(&mut self, symbol: impl Into<String>, config: SymbolStopConfig) {
        self.symbol_configs.insert(symbol.into(), config);
    }
}

impl RiskConfig {
    /// 기본값으로 새 설정을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 보수적인 설정 (높은 손익비 요구, 이른 보호).
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.rrr.min_rrr = 2.0;
        config.rrr.max_sl_atr_multiple = 2.0;
        config.htf.enabled = true;
        config.protection.partial_close_pct = 0.75;
        config.protection.full_close_pct = 1.5;
        config.protection.drawdown_block_pct = -0.3;
        config.protection.trailing.activate_after_secs = 900;
        config
    }

    /// 공격적인 설정 (낮은 손익비 허용, 늦은 보호).
    pub fn aggressive() -> Self {
        let mut config = Self::default();
        config.rrr.min_rrr = 1.2;
        config.rrr.max_sl_atr_multiple = 3.0;
        config.stop_target.session.compress_enabled = false;
        config.protection.partial_close_pct = 1.5;
        config.protection.full_close_pct = 3.0;
        config.protection.drawdown_block_pct = -1.0;
        config.protection.trailing.activate_after_secs = 3600;
        config
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let st = &self.stop_target;
        if st.sl_pips <= Decimal::ZERO || st.tp_pips <= Decimal::ZERO {
            return Err(ConfigValidationError::InvalidValue(
                "sl_pips and tp_pips must be greater than 0".into(),
            ));
        }
        if st.structure_lookback < 3 {
            return Err(ConfigValidationError::InvalidValue(
                "structure_lookback must be at least 3".into(),
            ));
        }
        if st.atr_period == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "atr_period must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&st.buffer_atr_fraction) {
            return Err(ConfigValidationError::InvalidValue(
                "buffer_atr_fraction must be between 0 and 1".into(),
            ));
        }
        if st.session.post_session_start_utc >= st.session.post_session_end_utc {
            return Err(ConfigValidationError::InvalidValue(
                "post_session_start_utc must be before post_session_end_utc".into(),
            ));
        }

        let vol = &self.volatility;
        if !(0.0..=1.0).contains(&vol.low_percentile)
            || !(0.0..=1.0).contains(&vol.high_percentile)
            || vol.low_percentile >= vol.high_percentile
        {
            return Err(ConfigValidationError::InvalidValue(
                "volatility percentiles must satisfy 0 <= low < high <= 1".into(),
            ));
        }
        if vol.low_multiplier <= 0.0 || vol.mid_multiplier <= 0.0 || vol.high_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "volatility multipliers must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.htf.min_score) {
            return Err(ConfigValidationError::InvalidValue(
                "htf.min_score must be between 0 and 1".into(),
            ));
        }

        let rrr = &self.rrr;
        if rrr.min_rrr <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "min_rrr must be greater than 0".into(),
            ));
        }
        if rrr.min_tp_pips <= Decimal::ZERO || rrr.min_tp_pips >= rrr.max_tp_pips {
            return Err(ConfigValidationError::InvalidValue(
                "tp pip bounds must satisfy 0 < min_tp_pips < max_tp_pips".into(),
            ));
        }

        let split = &self.tp_split;
        if split.tp1_ratio <= 0.0 || split.tp2_ratio <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "tp split ratios must be greater than 0".into(),
            ));
        }
        if (split.tp1_size + split.tp2_size - 1.0).abs() > 1e-9 {
            return Err(ConfigValidationError::InvalidValue(
                "tp split sizes must sum to 1".into(),
            ));
        }

        let prot = &self.protection;
        if prot.partial_close_pct <= 0.0 || prot.full_close_pct <= prot.partial_close_pct {
            return Err(ConfigValidationError::InvalidValue(
                "protection thresholds must satisfy 0 < partial_close_pct < full_close_pct".into(),
            ));
        }
        if prot.unblock_pct <= prot.drawdown_block_pct {
            return Err(ConfigValidationError::InvalidValue(
                "unblock_pct must be greater than drawdown_block_pct".into(),
            ));
        }
        if prot.partial_close_fraction <= 0.0 || prot.partial_close_fraction >= 1.0 {
            return Err(ConfigValidationError::InvalidValue(
                "partial_close_fraction must be between 0 and 1 (exclusive)".into(),
            ));
        }
        if prot.cycle_epsilon_pct < 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "cycle_epsilon_pct must not be negative".into(),
            ));
        }
        if prot.trailing.use_atr && prot.trailing.atr_period == 0 {
            return Err(ConfigValidationError::MissingField(
                "protection.trailing.atr_period".into(),
            ));
        }

        Ok(())
    }
}

/// 설정 검증 오류.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// "HH:MM" 형식의 시각 직렬화.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time '{}': {}", raw, e)))
    }
}
