//! 메모리 기반 모의 브로커.
//!
//! JSON 스냅샷(계좌, 포지션, 심볼 사양, 캔들)에서 시작해 변경 요청을 자신의 포지션에
//! 반영하고 기록합니다. 드라이런 실행과 보호 로직 테스트에 사용합니다.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BrokerError, BrokerGateway, Candle, Position};
use crate::error::SentinelResult;
use crate::types::{Price, Quantity, SymbolSpec, Timeframe};

/// 브로커 상태 스냅샷.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    /// 계좌 평가금액
    pub equity: Decimal,
    /// 계좌 잔고 (없으면 평가금액 - 미실현 손익)
    #[serde(default)]
    pub balance: Option<Decimal>,
    /// 오픈 포지션
    #[serde(default)]
    pub positions: Vec<Position>,
    /// 심볼 사양 (없는 심볼은 표준 외환 사양)
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
    /// 심볼별 캔들
    #[serde(default)]
    pub candles: HashMap<String, Vec<Candle>>,
}

impl BrokerSnapshot {
    /// JSON 파일에서 스냅샷을 읽습니다.
    pub fn from_file(path: impl AsRef<Path>) -> SentinelResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// 모의 브로커가 받은 변경 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationRequest {
    /// 부분/전체 청산
    Close {
        position_id: String,
        volume: Quantity,
    },
    /// 손절 변경
    ModifyStop {
        position_id: String,
        new_stop: Price,
    },
}

/// 메모리 기반 모의 브로커.
#[derive(Debug, Clone, Default)]
pub struct PaperBroker {
    snapshot: BrokerSnapshot,
    requests: Vec<MutationRequest>,
    rejected: HashSet<String>,
    reads_unavailable: bool,
}

impl PaperBroker {
    /// 스냅샷으로 모의 브로커를 생성합니다.
    pub fn new(snapshot: BrokerSnapshot) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    /// 평가금액만 가진 빈 계좌.
    pub fn with_equity(equity: Decimal) -> Self {
        Self::new(BrokerSnapshot {
            equity,
            ..Default::default()
        })
    }

    /// 현재 스냅샷.
    pub fn snapshot(&self) -> &BrokerSnapshot {
        &self.snapshot
    }

    /// 평가금액을 바꿉니다.
    pub fn set_equity(&mut self, equity: Decimal) {
        self.snapshot.equity = equity;
    }

    /// 포지션을 추가합니다.
    pub fn add_position(&mut self, position: Position) {
        self.snapshot.positions.push(position);
    }

    /// 포지션을 모두 제거합니다.
    pub fn clear_positions(&mut self) {
        self.snapshot.positions.clear();
    }

    /// 포지션을 찾아 수정합니다.
    pub fn position_mut(&mut self, position_id: &str) -> Option<&mut Position> {
        self.snapshot
            .positions
            .iter_mut()
            .find(|p| p.id == position_id)
    }

    /// 심볼 사양을 등록합니다.
    pub fn add_symbol(&mut self, spec: SymbolSpec) {
        self.snapshot.symbols.retain(|s| s.symbol != spec.symbol);
        self.snapshot.symbols.push(spec);
    }

    /// 심볼의 캔들을 설정합니다.
    pub fn set_candles(&mut self, symbol: impl Into<String>, candles: Vec<Candle>) {
        self.snapshot.candles.insert(symbol.into(), candles);
    }

    /// 해당 포지션에 대한 변경 요청을 거부하도록 설정합니다.
    pub fn reject_mutations_for(&mut self, position_id: impl Into<String>) {
        self.rejected.insert(position_id.into());
    }

    /// 거부 설정을 해제합니다.
    pub fn accept_mutations_for(&mut self, position_id: &str) {
        self.rejected.remove(position_id);
    }

    /// 조회 호출이 `Unavailable`을 반환하도록 설정합니다.
    pub fn set_reads_unavailable(&mut self, unavailable: bool) {
        self.reads_unavailable = unavailable;
    }

    /// 받아들여진 변경 요청 기록.
    pub fn requests(&self) -> &[MutationRequest] {
        &self.requests
    }

    /// 기록을 비우고 반환합니다.
    pub fn take_requests(&mut self) -> Vec<MutationRequest> {
        std::mem::take(&mut self.requests)
    }

    fn check_reads(&self) -> Result<(), BrokerError> {
        if self.reads_unavailable {
            return Err(BrokerError::Unavailable("paper broker offline".to_string()));
        }
        Ok(())
    }

    fn check_mutation(&self, position_id: &str) -> Result<(), BrokerError> {
        if self.rejected.contains(position_id) {
            return Err(BrokerError::Rejected(format!(
                "position {} rejected by paper broker",
                position_id
            )));
        }
        Ok(())
    }
}

impl BrokerGateway for PaperBroker {
    fn open_positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.check_reads()?;
        Ok(self.snapshot.positions.clone())
    }

    fn account_equity(&self) -> Result<Decimal, BrokerError> {
        self.check_reads()?;
        Ok(self.snapshot.equity)
    }

    fn account_balance(&self) -> Result<Decimal, BrokerError> {
        self.check_reads()?;
        let floating: Decimal = self
            .snapshot
            .positions
            .iter()
            .map(|p| p.floating_profit)
            .sum();
        Ok(self
            .snapshot
            .balance
            .unwrap_or(self.snapshot.equity - floating))
    }

    fn symbol_spec(&self, symbol: &str) -> Result<SymbolSpec, BrokerError> {
        Ok(self
            .snapshot
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .cloned()
            .unwrap_or_else(|| SymbolSpec::forex(symbol)))
    }

    fn close_position(&mut self, position_id: &str, volume: Quantity) -> Result<(), BrokerError> {
        self.check_mutation(position_id)?;
        let index = self
            .snapshot
            .positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| BrokerError::NotFound(format!("position {}", position_id)))?;

        let position = &mut self.snapshot.positions[index];
        if volume <= Decimal::ZERO || volume > position.volume {
            return Err(BrokerError::Rejected(format!(
                "invalid close volume {} for position {}",
                volume, position_id
            )));
        }

        if volume == position.volume {
            self.snapshot.positions.remove(index);
        } else {
            let remaining = position.volume - volume;
            position.floating_profit = position.floating_profit * remaining / position.volume;
            position.volume = remaining;
        }

        self.requests.push(MutationRequest::Close {
            position_id: position_id.to_string(),
            volume,
        });
        Ok(())
    }

    fn modify_stop(&mut self, position_id: &str, new_stop: Price) -> Result<(), BrokerError> {
        self.check_mutation(position_id)?;
        let position = self
            .position_mut(position_id)
            .ok_or_else(|| BrokerError::NotFound(format!("position {}", position_id)))?;
        position.stop_loss = Some(new_stop);

        self.requests.push(MutationRequest::ModifyStop {
            position_id: position_id.to_string(),
            new_stop,
        });
        Ok(())
    }

    fn candles(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        self.check_reads()?;
        let candles = self.snapshot.candles.get(symbol).cloned().unwrap_or_default();
        let start = candles.len().saturating_sub(count);
        Ok(candles[start..].to_vec())
    }

    fn broker_name(&self) -> &str {
        "paper"
    }
}
