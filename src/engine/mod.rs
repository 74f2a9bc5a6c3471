use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::BotSettings;
use crate::db::StateStore;
use crate::discovery::DiscoveryOutcome;
use crate::execution::{CandleStore, PositionManager};
use crate::models::{Candle, ExitReason, Timeframe, TradingMode};
use crate::notify::{Notification, Notifier};
use crate::risk::CooldownRegistry;
use crate::scanner::PairScanner;
use crate::strategy::make_scorer;

/// Inbound market data, funneled from every exchange stream into the one
/// engine consumer
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// Only closed candles are delivered here; the live-candle updates the
    /// feed layer sees with `isClosed == false` never reach the core
    CandleClosed {
        symbol: String,
        timeframe: Timeframe,
        candle: Candle,
    },
    PriceTick {
        symbol: String,
        price: f64,
    },
    DiscoveryCompleted(DiscoveryOutcome),
}

/// Explicit success/failure with a human-readable message; operator
/// commands never surface an uncaught error
pub type CommandReply = std::result::Result<String, String>;

/// Operator commands serialized through the same loop as market events
#[derive(Debug)]
pub enum ControlCommand {
    Start {
        reply: oneshot::Sender<CommandReply>,
    },
    Stop {
        reply: oneshot::Sender<CommandReply>,
    },
    SetMode {
        mode: TradingMode,
        reply: oneshot::Sender<CommandReply>,
    },
    UpdateSettings {
        settings: BotSettings,
        reply: oneshot::Sender<CommandReply>,
    },
    ClosePosition {
        id: u64,
        reply: oneshot::Sender<CommandReply>,
    },
    Shutdown,
}

/// The single logical owner of mutable bot state.
///
/// Every mutation of positions, scanned pairs and cooldowns happens inside
/// `run`'s event loop; each handler runs to completion before the next
/// event is processed, which is what keeps the position and series
/// invariants intact without per-field locking.
pub struct BotEngine {
    settings: BotSettings,
    /// Publishes accepted settings updates to the other loops (discovery)
    settings_tx: Option<watch::Sender<BotSettings>>,
    /// Publishes the monitored symbol list to the feed loop
    symbols_tx: Option<watch::Sender<Vec<String>>>,
    store: CandleStore,
    scanner: PairScanner,
    positions: PositionManager,
    cooldowns: CooldownRegistry,
    notifier: Notifier,
    state_store: Option<StateStore>,
}

impl BotEngine {
    pub fn new(
        settings: BotSettings,
        settings_tx: Option<watch::Sender<BotSettings>>,
        symbols_tx: Option<watch::Sender<Vec<String>>>,
        store: CandleStore,
        positions: PositionManager,
        notifier: Notifier,
        state_store: Option<StateStore>,
    ) -> Self {
        let scanner = PairScanner::new(make_scorer(&settings.strategy));
        Self {
            settings,
            settings_tx,
            symbols_tx,
            store,
            scanner,
            positions,
            cooldowns: CooldownRegistry::new(),
            notifier,
            state_store,
        }
    }

    pub fn scanner(&self) -> &PairScanner {
        &self.scanner
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// Consume events and commands until shutdown. Biased toward commands
    /// so an operator Stop takes effect before queued market data.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<MarketEvent>,
        mut commands: mpsc::Receiver<ControlCommand>,
    ) {
        tracing::info!("Engine loop started");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
            }
        }

        tracing::info!("Engine loop stopped");
    }

    /// Process one market event to completion
    pub async fn handle_event(&mut self, event: MarketEvent) {
        match event {
            MarketEvent::CandleClosed {
                symbol,
                timeframe,
                candle,
            } => self.on_candle_closed(&symbol, timeframe, candle).await,
            MarketEvent::PriceTick { symbol, price } => self.on_price_tick(&symbol, price).await,
            MarketEvent::DiscoveryCompleted(outcome) => self.apply_discovery(outcome),
        }
    }

    async fn on_candle_closed(&mut self, symbol: &str, timeframe: Timeframe, candle: Candle) {
        self.store.upsert(symbol, timeframe, candle);

        // settings snapshot for this whole evaluation cycle
        let settings = self.settings.clone();
        if timeframe != settings.scoring_tf() || !self.scanner.contains(symbol) {
            return;
        }

        let now = Utc::now();
        let candles = self.store.series(symbol, timeframe);
        let Some(outcome) =
            self.scanner
                .on_candle_closed(symbol, &candles, &settings, &self.cooldowns, now)
        else {
            return;
        };

        self.notifier
            .send(Notification::ScannerUpdate(outcome.pair.clone()));

        if outcome.pair.score.is_entry_signal() {
            let decision = self.positions.evaluate_entry(
                &outcome.pair,
                outcome.stop_hint,
                &settings,
                &self.cooldowns,
                now,
            );

            match decision.opened() {
                Some(_) => {
                    self.persist().await;
                    self.notify_positions();
                }
                None => {
                    if let crate::execution::EntryDecision::Skipped { reason } = &decision {
                        tracing::debug!(target: "trade", symbol, reason = %reason, "Entry skipped");
                    }
                }
            }
        }
    }

    async fn on_price_tick(&mut self, symbol: &str, price: f64) {
        self.scanner.update_price(symbol, price);

        let settings = self.settings.clone();
        let outcome =
            self.positions
                .on_price_tick(symbol, price, &settings, &mut self.cooldowns, Utc::now());

        if outcome.changed {
            self.persist().await;
            self.notify_positions();
        }
    }

    fn apply_discovery(&mut self, outcome: DiscoveryOutcome) {
        let keep: std::collections::HashSet<String> = outcome
            .records
            .iter()
            .map(|record| record.symbol.clone())
            .collect();

        let removed = self.scanner.retain_symbols(&keep);
        for symbol in &removed {
            self.store.remove_symbol(symbol);
        }

        let mut added = 0;
        for record in outcome.records {
            if self.scanner.upsert_from_discovery(
                &record.symbol,
                record.price,
                record.volume,
                record.regime,
                record.trend_long,
            ) {
                added += 1;
            }
            // discovery already hydrated the candle store
            self.scanner.mark_hydrated(&record.symbol);

            if let Some(pair) = self.scanner.get(&record.symbol) {
                self.notifier
                    .send(Notification::ScannerUpdate(pair.clone()));
            }
        }

        if let Some(tx) = &self.symbols_tx {
            let symbols: Vec<String> = self
                .scanner
                .pairs()
                .into_iter()
                .map(|pair| pair.symbol)
                .collect();
            let _ = tx.send(symbols);
        }

        tracing::info!(
            target: "scanner",
            monitored = self.scanner.len(),
            added,
            removed = removed.len(),
            failed = outcome.failed,
            "Discovery cycle merged"
        );
    }

    /// Process one operator command; false stops the loop
    pub async fn handle_command(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Start { reply } => {
                self.positions.set_running(true);
                self.persist().await;
                self.notify_status();
                let _ = reply.send(Ok("Bot started".to_string()));
            }
            ControlCommand::Stop { reply } => {
                // halts new entries and tick processing; open positions
                // stay open
                self.positions.set_running(false);
                self.persist().await;
                self.notify_status();
                let _ = reply.send(Ok("Bot stopped, open positions kept".to_string()));
            }
            ControlCommand::SetMode { mode, reply } => {
                self.positions.set_trading_mode(mode);
                self.persist().await;
                self.notify_status();
                let _ = reply.send(Ok(format!("Trading mode set to {:?}", mode)));
            }
            ControlCommand::UpdateSettings { settings, reply } => {
                let _ = reply.send(self.update_settings(settings).await);
            }
            ControlCommand::ClosePosition { id, reply } => {
                let _ = reply.send(self.manual_close(id).await);
            }
            ControlCommand::Shutdown => {
                return false;
            }
        }
        true
    }

    async fn update_settings(&mut self, settings: BotSettings) -> CommandReply {
        if let Err(error) = settings.validate() {
            return Err(format!("Settings rejected: {}", error));
        }

        if settings.strategy != self.settings.strategy {
            self.scanner.set_scorer(make_scorer(&settings.strategy));
        }

        self.settings = settings.clone();
        if let Some(tx) = &self.settings_tx {
            let _ = tx.send(settings.clone());
        }

        if let Some(store) = &self.state_store {
            if let Err(error) = store.save_settings(&settings).await {
                tracing::warn!(%error, "Failed to persist settings");
            }
        }

        Ok("Settings updated".to_string())
    }

    async fn manual_close(&mut self, id: u64) -> CommandReply {
        let Some(position) = self.positions.open_positions().iter().find(|p| p.id == id) else {
            return Err(format!("Position {} not found", id));
        };

        let symbol = position.symbol.clone();
        let price = self
            .scanner
            .get(&symbol)
            .map(|pair| pair.price)
            .filter(|price| *price > 0.0);

        let Some(price) = price else {
            return Err(format!("No market price available for {}", symbol));
        };

        let settings = self.settings.clone();
        match self.positions.close_position(
            id,
            price,
            ExitReason::Manual,
            &settings,
            &mut self.cooldowns,
            Utc::now(),
        ) {
            Ok(trade) => {
                self.persist().await;
                self.notify_positions();
                Ok(format!(
                    "Closed {} at {:.8} (pnl {:.2})",
                    trade.symbol, trade.exit_price, trade.pnl
                ))
            }
            Err(error) => Err(error.to_string()),
        }
    }

    /// Durable write after a state-changing operation. Failures are logged
    /// and never crash the loop.
    async fn persist(&mut self) {
        if let Some(store) = &self.state_store {
            if let Err(error) = store.save_state(self.positions.state()).await {
                tracing::warn!(%error, "State persistence failed");
            }
        }
    }

    fn notify_positions(&self) {
        let state = self.positions.state();
        self.notifier.send(Notification::PositionsUpdated {
            balance: state.balance,
            active_positions: state.active_positions.clone(),
            closed_trades: state.trade_history.len(),
        });
    }

    fn notify_status(&self) {
        let state = self.positions.state();
        self.notifier.send(Notification::BotStatusUpdate {
            is_running: state.is_running,
            trading_mode: state.trading_mode,
            balance: state.balance,
        });
    }
}
