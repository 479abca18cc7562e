//! 거래 제안 평가 명령.
//!
//! 캔들 JSON 파일을 읽어 손절/목표를 계산하고, 손익비 검증을 거쳐
//! 거래 계획 또는 거부 사유를 돌려줍니다. 보호 상태가 신규 진입을 막고
//! 있으면 계산 전에 거부합니다.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sentinel_core::{Candle, Price, Quantity, Side, SymbolSpec};
use sentinel_risk::{
    JsonFileStore, PostSessionContext, RiskConfig, StateStore, StopTargetRequest, TradeEvaluator,
    TradePlan,
};

/// 평가 명령 설정.
#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    /// 실행 타임프레임 캔들 JSON 파일
    pub candles_path: PathBuf,
    /// 상위 타임프레임 캔들 JSON 파일
    pub htf_candles_path: Option<PathBuf>,
    /// 심볼 사양 JSON 파일 (없으면 표준 외환 사양)
    pub spec_path: Option<PathBuf>,
    pub symbol: String,
    pub side: Side,
    pub entry: Price,
    /// 평가 시각 (없으면 현재 시각)
    pub at: Option<DateTime<Utc>>,
    /// 세션 후 잔고 비율 목표용 잔고
    pub balance: Option<Decimal>,
    /// 세션 후 잔고 비율 목표용 거래량
    pub volume: Option<Quantity>,
    /// 보호 상태 파일 (신규 진입 차단 확인)
    pub state_path: Option<PathBuf>,
}

/// 평가 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// 승인된 거래 계획
    Accepted { plan: TradePlan },
    /// 손익비 미달 또는 잘못된 배치로 거부
    Vetoed {
        symbol: String,
        side: Side,
        reason: String,
    },
    /// 드로다운 보호로 신규 진입 차단
    Blocked {
        symbol: String,
        side: Side,
        reason: String,
    },
}

impl EvaluationOutcome {
    /// 거래를 진행할 수 있는지 확인합니다.
    pub fn is_accepted(&self) -> bool {
        matches!(self, EvaluationOutcome::Accepted { .. })
    }
}

/// 캔들 JSON 파일을 읽습니다.
///
/// 형식이 잘못된 캔들(고가 < 저가 등)이 있으면 에러를 반환합니다.
pub fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candles from {}", path.display()))?;
    let candles: Vec<Candle> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse candles in {}", path.display()))?;

    if let Some(index) = candles.iter().position(|c| !c.is_well_formed()) {
        bail!(
            "Malformed candle at index {} in {}",
            index,
            path.display()
        );
    }
    Ok(candles)
}

fn load_spec(path: Option<&Path>, symbol: &str) -> Result<SymbolSpec> {
    let Some(path) = path else {
        return Ok(SymbolSpec::forex(symbol));
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read symbol spec from {}", path.display()))?;
    let spec: SymbolSpec = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse symbol spec in {}", path.display()))?;
    if spec.symbol != symbol {
        bail!(
            "Symbol spec is for {} but {} was requested",
            spec.symbol,
            symbol
        );
    }
    Ok(spec)
}

/// 거래 제안을 평가합니다.
pub fn run_evaluate(config: &EvaluateConfig, risk: &RiskConfig) -> Result<EvaluationOutcome> {
    if let Some(state_path) = &config.state_path {
        let state = JsonFileStore::new(state_path)
            .load()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Protection state unreadable, assuming not blocked");
                None
            });
        if let Some(state) = state.filter(|s| s.drawdown_blocked) {
            let reason = state
                .block_reason
                .unwrap_or_else(|| "drawdown limit reached".to_string());
            info!(symbol = %config.symbol, reason = %reason, "New trade blocked");
            return Ok(EvaluationOutcome::Blocked {
                symbol: config.symbol.clone(),
                side: config.side,
                reason,
            });
        }
    }

    let evaluator = TradeEvaluator::try_new(risk).context("Invalid risk configuration")?;
    let spec = load_spec(config.spec_path.as_deref(), &config.symbol)?;
    let candles = load_candles(&config.candles_path)?;
    let htf_candles = config
        .htf_candles_path
        .as_deref()
        .map(load_candles)
        .transpose()?;

    let now = config.at.unwrap_or_else(Utc::now);
    let mut request = StopTargetRequest::new(&spec, config.side, config.entry, &candles, now);
    if let Some(htf) = htf_candles.as_deref() {
        request = request.with_htf_candles(htf);
    }
    if let (Some(balance), Some(volume)) = (config.balance, config.volume) {
        request = request.with_post_session(PostSessionContext { balance, volume });
    }

    match evaluator.evaluate(&request) {
        Ok(plan) => Ok(EvaluationOutcome::Accepted { plan }),
        Err(e) if e.is_veto() => {
            info!(symbol = %config.symbol, side = %config.side, reason = %e, "Trade vetoed");
            Ok(EvaluationOutcome::Vetoed {
                symbol: config.symbol.clone(),
                side: config.side,
                reason: e.to_string(),
            })
        }
        Err(e) => Err(e).context("Trade evaluation failed"),
    }
}
