use chrono::{DateTime, Utc};

use crate::config::{BotSettings, BreakevenTriggerStyle};
use crate::models::{
    BotState, ClosedTrade, ExitReason, Position, PositionStatus, ScannedPair, Score, TradingMode,
};
use crate::risk::CooldownRegistry;

/// Outcome of an entry evaluation. Rejections are normal control flow
/// (logged as warnings where the operator should see them), never errors.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDecision {
    Opened(Position),
    Skipped { reason: String },
}

impl EntryDecision {
    pub fn opened(&self) -> Option<&Position> {
        match self {
            EntryDecision::Opened(position) => Some(position),
            EntryDecision::Skipped { .. } => None,
        }
    }
}

/// A partial take-profit fill realized on a price tick
#[derive(Debug, Clone, PartialEq)]
pub struct PartialExit {
    pub position_id: u64,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub realized_pnl: f64,
}

/// What a price tick did to the open positions on a symbol
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Any position field changed (persist + notify)
    pub changed: bool,
    pub partial_exits: Vec<PartialExit>,
    pub closed: Vec<ClosedTrade>,
}

/// Owns the bot state aggregate: balance, open positions, trade history.
///
/// All mutation is serialized through the engine loop; every operation
/// leaves the core invariants intact (at most one open position per symbol,
/// monotonic trailing stops, conservative balance accounting).
///
/// Accounting model: full notional. Entry reserves `entry_price *
/// quantity` from the balance; every sell, partial or final, credits
/// `price * quantity_sold`. `realized_pnl` is reporting-only.
///
/// Exit policy: take-profit stays active while trailing is enabled; the
/// trailing mechanism only ever raises the stop.
pub struct PositionManager {
    state: BotState,
}

impl PositionManager {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            state: BotState::new(initial_balance),
        }
    }

    /// Restore from persisted state
    pub fn from_state(state: BotState) -> Self {
        let open = state.active_positions.len();
        tracing::info!(
            target: "trade",
            open_positions = open,
            closed_trades = state.trade_history.len(),
            balance = state.balance,
            "Restored bot state"
        );
        Self { state }
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    pub fn balance(&self) -> f64 {
        self.state.balance
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn set_running(&mut self, running: bool) {
        self.state.is_running = running;
    }

    pub fn trading_mode(&self) -> TradingMode {
        self.state.trading_mode
    }

    pub fn set_trading_mode(&mut self, mode: TradingMode) {
        self.state.trading_mode = mode;
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.state.active_positions
    }

    pub fn trade_history(&self) -> &[ClosedTrade] {
        &self.state.trade_history
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.state
            .active_positions
            .iter()
            .any(|p| p.symbol == symbol)
    }

    /// Gate and execute a new entry from a scored pair.
    ///
    /// Preconditions, in order: bot running, capacity, no open position on
    /// the symbol, qualifying score, no active cooldown. The percentage
    /// stop acts as a maximum-risk ceiling over ATR/structural stops; a
    /// final stop at or above the entry price rejects the trade.
    pub fn evaluate_entry(
        &mut self,
        pair: &ScannedPair,
        stop_hint: Option<f64>,
        settings: &BotSettings,
        cooldowns: &CooldownRegistry,
        now: DateTime<Utc>,
    ) -> EntryDecision {
        if !self.state.is_running {
            return skip("bot is not running");
        }

        if self.state.active_positions.len() >= settings.max_open_positions {
            return skip("max open positions reached");
        }

        if self.has_open_position(&pair.symbol) {
            return skip("already have an open position for this symbol");
        }

        let qualifies = pair.score == Score::StrongBuy
            || (!settings.require_strong_buy && pair.score == Score::Buy);
        if !qualifies {
            return skip("score does not qualify for entry");
        }

        if cooldowns.is_active(&pair.symbol, now) {
            return skip("symbol is in loss cooldown");
        }

        let mut entry_price = pair.price;
        if entry_price <= 0.0 {
            return skip("no valid price for symbol");
        }
        if self.state.trading_mode == TradingMode::SimulatedRealFeed {
            entry_price *= 1.0 + settings.slippage_pct / 100.0;
        }

        let size_pct = if pair.score == Score::StrongBuy && settings.use_dynamic_position_sizing {
            settings.strong_buy_position_size_pct
        } else {
            settings.position_size_pct
        };

        let cost = self.state.balance * size_pct / 100.0;
        if cost <= 0.0 || cost > self.state.balance {
            tracing::warn!(target: "trade", symbol = %pair.symbol, "Insufficient balance for entry");
            return skip("insufficient balance");
        }
        let quantity = cost / entry_price;

        // Percentage stop is the maximum-risk ceiling: a looser computed
        // stop is clamped up to it.
        let fallback_stop = entry_price * (1.0 - settings.stop_loss_pct / 100.0);
        let computed_stop = if settings.use_atr_stop_loss && pair.atr > 0.0 {
            Some(entry_price - pair.atr * settings.atr_multiplier)
        } else {
            stop_hint
        };
        let stop_loss = computed_stop
            .map(|stop| stop.max(fallback_stop))
            .unwrap_or(fallback_stop);

        if stop_loss >= entry_price {
            tracing::warn!(
                target: "trade",
                symbol = %pair.symbol,
                stop_loss,
                entry_price,
                "Trade rejected: stop-loss at or above entry"
            );
            return skip("stop-loss would be at or above entry price");
        }

        let take_profit = entry_price * (1.0 + settings.take_profit_pct / 100.0);

        self.state.trade_id_counter += 1;
        let position = Position {
            id: self.state.trade_id_counter,
            symbol: pair.symbol.clone(),
            entry_price,
            quantity,
            initial_quantity: quantity,
            stop_loss,
            take_profit,
            highest_price_since_entry: entry_price,
            entry_time: now,
            status: PositionStatus::Filled,
            realized_pnl: 0.0,
            is_at_breakeven: false,
            partial_tp_hit: false,
        };

        self.state.balance -= cost;
        self.state.active_positions.push(position.clone());

        tracing::info!(
            target: "trade",
            symbol = %position.symbol,
            id = position.id,
            entry_price,
            quantity,
            stop_loss,
            take_profit,
            "Opened position"
        );

        EntryDecision::Opened(position)
    }

    /// Apply one price tick to every open position on `symbol`.
    ///
    /// Order per position: high-water mark, trailing stop, break-even,
    /// partial take-profit, then exit checks (stop-loss before
    /// take-profit). No-op while the bot is stopped.
    pub fn on_price_tick(
        &mut self,
        symbol: &str,
        price: f64,
        settings: &BotSettings,
        cooldowns: &mut CooldownRegistry,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if !self.state.is_running {
            return outcome;
        }

        let mut to_close: Vec<(u64, ExitReason)> = Vec::new();

        for position in self
            .state
            .active_positions
            .iter_mut()
            .filter(|p| p.symbol == symbol)
        {
            if price > position.highest_price_since_entry {
                position.highest_price_since_entry = price;
                outcome.changed = true;
            }

            if settings.use_trailing_stop_loss {
                let candidate = position.highest_price_since_entry
                    * (1.0 - settings.trailing_stop_loss_pct / 100.0);
                if candidate > position.stop_loss {
                    position.stop_loss = candidate;
                    outcome.changed = true;
                }
            }

            if settings.use_auto_breakeven && !position.is_at_breakeven {
                let triggered = match settings.breakeven_trigger_style {
                    BreakevenTriggerStyle::Percent => {
                        position.pnl_pct(price) >= settings.breakeven_trigger
                    }
                    BreakevenTriggerStyle::RMultiple => {
                        let risk = position.initial_risk_per_unit();
                        risk > 0.0
                            && price - position.entry_price >= settings.breakeven_trigger * risk
                    }
                };

                if triggered {
                    // never lower an already-trailed stop
                    position.stop_loss = position.stop_loss.max(position.entry_price);
                    position.is_at_breakeven = true;
                    outcome.changed = true;
                    tracing::info!(
                        target: "trade",
                        symbol,
                        id = position.id,
                        stop_loss = position.stop_loss,
                        "Stop moved to break-even"
                    );
                }
            }

            if settings.use_partial_take_profit
                && !position.partial_tp_hit
                && position.pnl_pct(price) >= settings.partial_tp_trigger_pct
            {
                let quantity =
                    (position.initial_quantity * settings.partial_tp_sell_qty_pct / 100.0)
                        .min(position.quantity);
                let realized = (price - position.entry_price) * quantity;

                position.quantity -= quantity;
                position.realized_pnl += realized;
                position.partial_tp_hit = true;
                self.state.balance += quantity * price;
                outcome.changed = true;

                tracing::info!(
                    target: "trade",
                    symbol,
                    id = position.id,
                    quantity,
                    price,
                    realized,
                    "Partial take-profit filled"
                );

                outcome.partial_exits.push(PartialExit {
                    position_id: position.id,
                    symbol: symbol.to_string(),
                    quantity,
                    price,
                    realized_pnl: realized,
                });
            }

            if price <= position.stop_loss {
                to_close.push((position.id, ExitReason::StopLoss));
            } else if price >= position.take_profit {
                to_close.push((position.id, ExitReason::TakeProfit));
            }
        }

        for (id, reason) in to_close {
            match self.close_position(id, price, reason, settings, cooldowns, now) {
                Ok(trade) => {
                    outcome.changed = true;
                    outcome.closed.push(trade);
                }
                Err(error) => {
                    tracing::warn!(target: "trade", symbol, id, %error, "Exit close failed");
                }
            }
        }

        outcome
    }

    /// Close an open position at `exit_price`.
    ///
    /// Unknown or already-closed ids return Err without touching the
    /// balance. A losing close records a cooldown when one is configured.
    pub fn close_position(
        &mut self,
        id: u64,
        exit_price: f64,
        reason: ExitReason,
        settings: &BotSettings,
        cooldowns: &mut CooldownRegistry,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ClosedTrade> {
        let index = self
            .state
            .active_positions
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| anyhow::anyhow!("Position {} not found or already closed", id))?;

        let mut position = self.state.active_positions.remove(index);
        position.status = PositionStatus::Closed;

        let total_pnl = position.realized_pnl
            + (exit_price - position.entry_price) * position.quantity;
        let initial_notional = position.entry_price * position.initial_quantity;
        let pnl_pct = if initial_notional > 0.0 {
            total_pnl / initial_notional * 100.0
        } else {
            0.0
        };

        self.state.balance += exit_price * position.quantity;

        let trade = ClosedTrade {
            id: position.id,
            symbol: position.symbol.clone(),
            entry_price: position.entry_price,
            exit_price,
            initial_quantity: position.initial_quantity,
            pnl: total_pnl,
            pnl_pct,
            reason,
            entry_time: position.entry_time,
            exit_time: now,
        };
        self.state.trade_history.push(trade.clone());

        tracing::info!(
            target: "trade",
            symbol = %trade.symbol,
            id,
            exit_price,
            pnl = total_pnl,
            pnl_pct,
            ?reason,
            "Closed position"
        );

        if total_pnl < 0.0 {
            cooldowns.record_loss(&trade.symbol, now, settings.loss_cooldown_hours);
        }

        Ok(trade)
    }
}

fn skip(reason: &str) -> EntryDecision {
    EntryDecision::Skipped {
        reason: reason.to_string(),
    }
}
