//! 포지션 보호 매니저.
//!
//! 제어 루프가 틱마다 호출하는 2단계 보호 상태 머신입니다:
//! - 세션 기준 평가금액 설정과 세션 리셋
//! - 드로다운 차단 (히스테리시스)
//! - 보유 시간 기반 트레일링 손절
//! - +1% 부분 청산 + 본전 손절, +2% 전체 청산
//!
//! 브로커 변경 요청이 실패하면 플래그를 세우지 않으므로 다음 틱에서 같은
//! 트리거가 다시 시도됩니다. 상태는 변경될 때마다 저장소에 기록됩니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{decimal_from_f64, protection_span, BrokerGateway, Position, Price, Quantity};

use crate::config::ProtectionConfig;
use crate::error::RiskResult;

use super::drawdown::{DrawdownGuard, DrawdownTransition};
use super::state::{PartialProgress, ProtectionState, TrailingRecord};
use super::store::StateStore;
use super::trailing::TrailingStopPlanner;

/// 한 틱에서 수행된 보호 동작.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProtectionAction {
    /// 세션 기준 평가금액 설정
    BaselineSet { equity: Decimal, reason: String },
    /// 세션 리셋
    SessionReset { equity: Decimal, reason: String },
    /// 신규 거래 차단
    DrawdownBlocked { floating_pct: f64, reason: String },
    /// 차단 해제
    DrawdownUnblocked { floating_pct: f64, reason: String },
    /// 트레일링 손절 적용
    TrailingApplied {
        position_id: String,
        stop: Price,
        reason: String,
    },
    /// 부분 청산
    PartialClose {
        position_id: String,
        volume: Quantity,
        reason: String,
    },
    /// 본전 손절 설정
    BreakevenSet {
        position_id: String,
        stop: Price,
        reason: String,
    },
    /// 전체 청산
    FullClose {
        position_id: String,
        volume: Quantity,
        reason: String,
    },
}

impl ProtectionAction {
    /// 사람이 읽을 수 있는 사유.
    pub fn reason(&self) -> &str {
        match self {
            ProtectionAction::BaselineSet { reason, .. }
            | ProtectionAction::SessionReset { reason, .. }
            | ProtectionAction::DrawdownBlocked { reason, .. }
            | ProtectionAction::DrawdownUnblocked { reason, .. }
            | ProtectionAction::TrailingApplied { reason, .. }
            | ProtectionAction::PartialClose { reason, .. }
            | ProtectionAction::BreakevenSet { reason, .. }
            | ProtectionAction::FullClose { reason, .. } => reason,
        }
    }

    /// 브로커에 변경 요청을 보낸 동작인지.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ProtectionAction::TrailingApplied { .. }
                | ProtectionAction::PartialClose { .. }
                | ProtectionAction::BreakevenSet { .. }
                | ProtectionAction::FullClose { .. }
        )
    }
}

/// 틱 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// 세션 기준 대비 변동률 (%)
    pub floating_equity_pct: f64,
    /// 수행된 동작 (순서대로)
    pub actions: Vec<ProtectionAction>,
    /// 신규 거래 차단 여부
    pub trading_blocked: bool,
    /// 차단 사유
    pub block_reason: Option<String>,
    /// 이번 틱에서 세션이 리셋되었는지
    pub session_reset: bool,
}

impl TickReport {
    /// 아무 동작도 없었는지.
    pub fn is_quiet(&self) -> bool {
        self.actions.is_empty()
    }
}

/// 운영자용 보호 상태 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionStatus {
    pub session_baseline_equity: Decimal,
    pub baseline_set: bool,
    pub partial_close_done: bool,
    pub full_close_done: bool,
    pub new_trade_since_partial: bool,
    pub trading_blocked: bool,
    pub block_reason: Option<String>,
    /// 트레일링이 적용된 포지션 수
    pub trailing_positions: usize,
    pub last_reset_at: Option<DateTime<Utc>>,
}

/// 포지션 보호 매니저.
pub struct ProtectionManager {
    config: ProtectionConfig,
    drawdown: DrawdownGuard,
    trailing: TrailingStopPlanner,
    store: Box<dyn StateStore>,
    state: ProtectionState,
}

impl ProtectionManager {
    /// 저장소에서 상태를 읽어 매니저를 생성합니다.
    ///
    /// 저장된 상태를 읽을 수 없으면 에러를 기록하고 기본 상태로 시작합니다.
    pub fn new(config: ProtectionConfig, store: Box<dyn StateStore>) -> Self {
        let state = match store.load() {
            Ok(Some(state)) => {
                tracing::info!(
                    store = %store.describe(),
                    baseline = %state.session_baseline_equity,
                    partial_done = state.partial_close_done,
                    full_done = state.full_close_done,
                    "Protection state restored"
                );
                state
            }
            Ok(None) => ProtectionState::default(),
            Err(e) => {
                tracing::error!(
                    store = %store.describe(),
                    error = %e,
                    "Failed to load protection state, starting from defaults"
                );
                ProtectionState::default()
            }
        };

        Self {
            drawdown: DrawdownGuard::from_config(&config),
            trailing: TrailingStopPlanner::new(config.trailing.clone()),
            config,
            store,
            state,
        }
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    pub fn state(&self) -> &ProtectionState {
        &self.state
    }

    /// 운영자용 상태 요약.
    pub fn status(&self) -> ProtectionStatus {
        ProtectionStatus {
            session_baseline_equity: self.state.session_baseline_equity,
            baseline_set: self.state.baseline_set,
            partial_close_done: self.state.partial_close_done,
            full_close_done: self.state.full_close_done,
            new_trade_since_partial: self.state.new_trade_since_partial,
            trading_blocked: self.state.drawdown_blocked,
            block_reason: self.state.block_reason.clone(),
            trailing_positions: self.state.trailing_applied.len(),
            last_reset_at: self.state.last_reset_at,
        }
    }

    /// 드로다운으로 신규 거래가 차단되었는지.
    pub fn is_trading_blocked(&self) -> bool {
        self.state.drawdown_blocked
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.state.block_reason.as_deref()
    }

    /// 새 거래가 열렸음을 알립니다. 부분 청산 이후에만 의미가 있습니다.
    pub fn mark_new_trade_opened(&mut self) {
        if self.state.partial_close_done && !self.state.new_trade_since_partial {
            self.state.new_trade_since_partial = true;
            tracing::info!("New trade opened after partial close, full-close stage armed");
            self.persist();
        }
    }

    /// 운영자 요청으로 세션을 리셋합니다.
    pub fn reset_session(&mut self, equity: Decimal, now: DateTime<Utc>) {
        self.state.reset(equity, now);
        tracing::info!(baseline = %equity, "Protection session reset by operator");
        self.persist();
    }

    /// 보호 틱 한 번.
    ///
    /// 포지션이나 평가금액을 읽지 못하면 상태를 건드리지 않고
    /// `RiskError::Broker`를 반환합니다.
    pub fn tick(
        &mut self,
        broker: &mut dyn BrokerGateway,
        now: DateTime<Utc>,
    ) -> RiskResult<TickReport> {
        let span = protection_span!("protection_tick");
        let _guard = span.enter();

        let mut positions = broker.open_positions()?;
        let equity = broker.account_equity()?;

        let mut actions = Vec::new();
        let mut session_reset = false;

        if !self.state.baseline_set && positions.is_empty() {
            self.state.session_baseline_equity = equity;
            self.state.baseline_set = true;
            tracing::info!(baseline = %equity, "Session baseline set");
            actions.push(ProtectionAction::BaselineSet {
                equity,
                reason: format!("no open positions, baseline equity {}", equity),
            });
            self.persist();
        }

        if let Some(reason) = self.reset_reason(&positions, equity, now) {
            self.state.reset(equity, now);
            tracing::info!(baseline = %equity, reason = %reason, "Protection session reset");
            actions.push(ProtectionAction::SessionReset { equity, reason });
            session_reset = true;
            self.persist();
        }

        self.detect_new_trades(&positions);

        let floating_pct = self.state.floating_pct(equity);
        self.apply_drawdown(floating_pct, &mut actions);
        self.apply_trailing(broker, &mut positions, now, &mut actions);
        self.apply_partial_stage(broker, &mut positions, floating_pct, now, &mut actions);
        self.apply_full_stage(broker, &positions, floating_pct, &mut actions);

        Ok(TickReport {
            floating_equity_pct: floating_pct,
            actions,
            trading_blocked: self.state.drawdown_blocked,
            block_reason: self.state.block_reason.clone(),
            session_reset,
        })
    }

    fn reset_reason(
        &self,
        positions: &[Position],
        equity: Decimal,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if !positions.is_empty() || self.state.is_pristine(equity) {
            return None;
        }

        let floating_pct = self.state.floating_pct(equity);
        if floating_pct.abs() <= self.config.cycle_epsilon_pct {
            return Some(format!(
                "flat with floating equity {:.2}% within {:.2}%",
                floating_pct, self.config.cycle_epsilon_pct
            ));
        }
        if now.time() >= self.config.session_end_utc {
            return Some(format!(
                "session end {} reached",
                self.config.session_end_utc.format("%H:%M")
            ));
        }
        None
    }

    fn detect_new_trades(&mut self, positions: &[Position]) {
        if !self.state.partial_close_done || self.state.new_trade_since_partial {
            return;
        }
        let Some(done_at) = self.state.partial_done_at else {
            return;
        };
        if let Some(position) = positions.iter().find(|p| p.open_time > done_at) {
            tracing::info!(
                position_id = %position.id,
                "Position opened after partial close, full-close stage armed"
            );
            self.state.new_trade_since_partial = true;
            self.persist();
        }
    }

    fn apply_drawdown(&mut self, floating_pct: f64, actions: &mut Vec<ProtectionAction>) {
        match self
            .drawdown
            .evaluate(self.state.drawdown_blocked, floating_pct)
        {
            DrawdownTransition::Blocked => {
                let reason = self.drawdown.block_reason(floating_pct);
                tracing::warn!(floating_pct, reason = %reason, "New trades blocked");
                self.state.drawdown_blocked = true;
                self.state.block_reason = Some(reason.clone());
                actions.push(ProtectionAction::DrawdownBlocked {
                    floating_pct,
                    reason,
                });
                self.persist();
            }
            DrawdownTransition::Unblocked => {
                let reason = format!(
                    "floating equity {:.2}% recovered to {:.2}%",
                    floating_pct,
                    self.drawdown.unblock_pct()
                );
                tracing::info!(floating_pct, "New trades unblocked");
                self.state.drawdown_blocked = false;
                self.state.block_reason = None;
                actions.push(ProtectionAction::DrawdownUnblocked {
                    floating_pct,
                    reason,
                });
                self.persist();
            }
            DrawdownTransition::Unchanged => {}
        }
    }

    fn apply_trailing(
        &mut self,
        broker: &mut dyn BrokerGateway,
        positions: &mut [Position],
        now: DateTime<Utc>,
        actions: &mut Vec<ProtectionAction>,
    ) {
        for position in positions.iter_mut() {
            if self.state.trailing_applied.contains_key(&position.id)
                || !self.trailing.is_due(position, now)
            {
                continue;
            }

            let span = protection_span!("trailing", position.id, position.symbol);
            let _guard = span.enter();

            let spec = match broker.symbol_spec(&position.symbol) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!(error = %e, "Symbol spec unavailable, trailing skipped");
                    continue;
                }
            };
            let distance = match self.trailing.distance(&*broker, position, &spec) {
                Ok(distance) => distance,
                Err(e) => {
                    tracing::warn!(error = %e, "Trailing distance unavailable, skipped this tick");
                    continue;
                }
            };
            let Some(stop) = self.trailing.proposed_stop(position, distance, &spec) else {
                tracing::debug!(distance = %distance, "Current stop already tighter");
                continue;
            };

            match broker.modify_stop(&position.id, stop) {
                Ok(()) => {
                    tracing::info!(stop = %stop, distance = %distance, "Trailing stop applied");
                    position.stop_loss = Some(stop);
                    self.state
                        .trailing_applied
                        .insert(position.id.clone(), TrailingRecord { applied_at: now, stop });
                    actions.push(ProtectionAction::TrailingApplied {
                        position_id: position.id.clone(),
                        stop,
                        reason: format!(
                            "held {} min in profit, trailing {} behind {}",
                            position.age(now).num_minutes(),
                            distance,
                            position.current_price
                        ),
                    });
                    self.persist();
                }
                Err(e) => {
                    tracing::warn!(error = %e, stop = %stop, "Trailing stop rejected, will retry");
                }
            }
        }
    }

    fn apply_partial_stage(
        &mut self,
        broker: &mut dyn BrokerGateway,
        positions: &mut Vec<Position>,
        floating_pct: f64,
        now: DateTime<Utc>,
        actions: &mut Vec<ProtectionAction>,
    ) {
        if self.state.partial_close_done || floating_pct < self.config.partial_close_pct {
            return;
        }

        // 수익 중인 포지션 + 이전 틱에서 끝내지 못한 포지션
        let targets: Vec<Position> = positions
            .iter()
            .filter(|p| {
                p.is_profitable()
                    || self
                        .state
                        .partial_progress
                        .get(&p.id)
                        .is_some_and(|progress| !progress.is_complete())
            })
            .cloned()
            .collect();
        if targets.is_empty() {
            tracing::debug!(floating_pct, "Partial stage triggered without profitable positions");
            return;
        }

        let span = protection_span!("partial_stage");
        let _guard = span.enter();
        tracing::info!(
            floating_pct,
            threshold = self.config.partial_close_pct,
            positions = targets.len(),
            "Partial close stage triggered"
        );

        let mut all_complete = true;
        for position in &targets {
            let progress = self.partial_for(broker, position, floating_pct, positions, actions);
            all_complete &= progress.is_complete();
        }

        if all_complete {
            self.state.partial_close_done = true;
            self.state.partial_done_at = Some(now);
            self.state.new_trade_since_partial = false;
            tracing::info!("Partial close stage complete");
            self.persist();
        }
    }

    /// 포지션 하나의 부분 청산과 본전 손절. 갱신된 진행 상황을 반환합니다.
    fn partial_for(
        &mut self,
        broker: &mut dyn BrokerGateway,
        position: &Position,
        floating_pct: f64,
        positions: &mut Vec<Position>,
        actions: &mut Vec<ProtectionAction>,
    ) -> PartialProgress {
        let mut progress = self
            .state
            .partial_progress
            .get(&position.id)
            .copied()
            .unwrap_or_default();
        if progress.is_complete() {
            return progress;
        }

        let spec = match broker.symbol_spec(&position.symbol) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!(position_id = %position.id, error = %e, "Symbol spec unavailable");
                return progress;
            }
        };

        if !progress.closed {
            let mut volume = spec.normalize_volume(
                position.volume * decimal_from_f64(self.config.partial_close_fraction),
            );
            if volume < spec.min_volume || volume <= Decimal::ZERO {
                volume = position.volume;
            }

            match broker.close_position(&position.id, volume) {
                Ok(()) => {
                    tracing::info!(position_id = %position.id, volume = %volume, "Partial close");
                    progress.closed = true;
                    actions.push(ProtectionAction::PartialClose {
                        position_id: position.id.clone(),
                        volume,
                        reason: format!(
                            "floating equity {:.2}% reached partial stage {:.2}%",
                            floating_pct, self.config.partial_close_pct
                        ),
                    });

                    if volume >= position.volume {
                        // 남은 물량이 없으면 본전 손절도 필요 없음
                        progress.breakeven = true;
                        positions.retain(|p| p.id != position.id);
                    } else if let Some(local) = positions.iter_mut().find(|p| p.id == position.id) {
                        local.volume -= volume;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        position_id = %position.id,
                        error = %e,
                        "Partial close rejected, will retry"
                    );
                }
            }
            self.record_progress(&position.id, progress);
        }

        if progress.closed && !progress.breakeven {
            let safety = spec.tick_size * Decimal::from(self.config.breakeven_tick_safety);
            let breakeven = spec.round_away_from(
                position.side.target_from(position.entry_price, safety),
                position.entry_price,
            );
            let current = positions
                .iter()
                .find(|p| p.id == position.id)
                .and_then(|p| p.stop_loss)
                .or(position.stop_loss);

            match current {
                Some(stop) if !position.side.is_tighter_stop(breakeven, stop) => {
                    tracing::debug!(
                        position_id = %position.id,
                        stop = %stop,
                        "Stop already at or beyond breakeven"
                    );
                    progress.breakeven = true;
                }
                _ => match broker.modify_stop(&position.id, breakeven) {
                    Ok(()) => {
                        tracing::info!(position_id = %position.id, stop = %breakeven, "Breakeven stop set");
                        progress.breakeven = true;
                        if let Some(local) = positions.iter_mut().find(|p| p.id == position.id) {
                            local.stop_loss = Some(breakeven);
                        }
                        actions.push(ProtectionAction::BreakevenSet {
                            position_id: position.id.clone(),
                            stop: breakeven,
                            reason: format!(
                                "breakeven {} ticks beyond entry {} after partial close",
                                self.config.breakeven_tick_safety, position.entry_price
                            ),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            position_id = %position.id,
                            error = %e,
                            "Breakeven stop rejected, will retry"
                        );
                    }
                },
            }
            self.record_progress(&position.id, progress);
        }

        progress
    }

    fn apply_full_stage(
        &mut self,
        broker: &mut dyn BrokerGateway,
        positions: &[Position],
        floating_pct: f64,
        actions: &mut Vec<ProtectionAction>,
    ) {
        if self.state.full_close_done
            || !self.state.partial_close_done
            || !self.state.new_trade_since_partial
            || floating_pct < self.config.full_close_pct
        {
            return;
        }

        let targets: Vec<&Position> = positions.iter().filter(|p| p.is_profitable()).collect();
        if targets.is_empty() {
            tracing::debug!(floating_pct, "Full stage triggered without profitable positions");
            return;
        }

        let span = protection_span!("full_stage");
        let _guard = span.enter();
        tracing::info!(
            floating_pct,
            threshold = self.config.full_close_pct,
            positions = targets.len(),
            "Full close stage triggered"
        );

        let mut all_closed = true;
        for position in targets {
            match broker.close_position(&position.id, position.volume) {
                Ok(()) => {
                    tracing::info!(position_id = %position.id, volume = %position.volume, "Full close");
                    actions.push(ProtectionAction::FullClose {
                        position_id: position.id.clone(),
                        volume: position.volume,
                        reason: format!(
                            "floating equity {:.2}% reached full stage {:.2}%",
                            floating_pct, self.config.full_close_pct
                        ),
                    });
                }
                Err(e) => {
                    all_closed = false;
                    tracing::warn!(
                        position_id = %position.id,
                        error = %e,
                        "Full close rejected, will retry"
                    );
                }
            }
        }

        if all_closed {
            self.state.full_close_done = true;
            tracing::info!("Full close stage complete");
            self.persist();
        }
    }

    fn record_progress(&mut self, position_id: &str, progress: PartialProgress) {
        let previous = self
            .state
            .partial_progress
            .get(position_id)
            .copied()
            .unwrap_or_default();
        if previous != progress {
            self.state
                .partial_progress
                .insert(position_id.to_string(), progress);
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            tracing::error!(
                store = %self.store.describe(),
                error = %e,
                "Failed to persist protection state"
            );
        }
    }
}
