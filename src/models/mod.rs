use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candle interval on the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
}

impl Timeframe {
    /// Wire label used by the exchange API ("1m", "5m", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            _ => None,
        }
    }
}

/// OHLCV candlestick. The symbol lives in the store key, not here.
///
/// Immutable once closed; the live (still-open) candle for a timeframe is
/// replaced in place on every update until the exchange closes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Short-horizon trend direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Trend {
    Up,
    Down,
    #[default]
    Neutral,
}

/// Long-timeframe market regime from the discovery cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MarketRegime {
    Uptrend,
    Downtrend,
    #[default]
    Neutral,
}

/// Discrete output of the signal scorer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Score {
    #[default]
    Hold,
    Buy,
    StrongBuy,
    Cooldown,
    Compression,
    FakeBreakout,
}

impl Score {
    /// True for scores that qualify for a new entry (before cooldown override)
    pub fn is_entry_signal(&self) -> bool {
        matches!(self, Score::Buy | Score::StrongBuy)
    }
}

/// Strategy-variant metrics attached to a scanned pair.
///
/// One tagged union instead of an open map: each scorer fills its own
/// variant, selected by the configured strategy id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StrategyMetrics {
    None,
    FilterChain {
        macd_histogram: f64,
        sma_short: f64,
        avg_volume: f64,
    },
    Breakout {
        band_width_pct: f64,
        upper_band: f64,
        squeezed: bool,
    },
}

impl Default for StrategyMetrics {
    fn default() -> Self {
        StrategyMetrics::None
    }
}

/// Mutable per-symbol record maintained by discovery + scanner.
///
/// Single writer (the engine loop), many readers via scanner updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScannedPair {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub volatility: f64,
    pub trend: Trend,
    pub trend_long: Trend,
    pub market_regime: MarketRegime,
    pub rsi: f64,
    pub adx: f64,
    pub atr: f64,
    pub score: Score,
    /// Pre-cooldown-override score, kept visible for observability
    pub raw_score: Score,
    pub metrics: StrategyMetrics,
    /// Set on newly discovered symbols until historical candles are loaded
    pub needs_hydration: bool,
}

impl ScannedPair {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            needs_hydration: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionStatus {
    Filled,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
}

/// An open long position.
///
/// Invariants maintained by the position manager:
/// - `quantity <= initial_quantity`
/// - `stop_loss < entry_price` at creation
/// - `highest_price_since_entry` never decreases
/// - `stop_loss` never decreases once trailing is active
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: u64,
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub initial_quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub highest_price_since_entry: f64,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
    /// PnL already locked in by partial exits
    pub realized_pnl: f64,
    pub is_at_breakeven: bool,
    pub partial_tp_hit: bool,
}

impl Position {
    /// Risk per unit at entry, used for R-multiple break-even triggers
    pub fn initial_risk_per_unit(&self) -> f64 {
        self.entry_price - self.stop_loss
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.quantity
    }

    /// Total PnL percent relative to the initial notional
    pub fn pnl_pct(&self, price: f64) -> f64 {
        let notional = self.entry_price * self.initial_quantity;
        if notional == 0.0 {
            return 0.0;
        }
        (self.realized_pnl + self.unrealized_pnl(price)) / notional * 100.0
    }
}

/// Append-only record of a closed position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosedTrade {
    pub id: u64,
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub initial_quantity: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub reason: ExitReason,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TradingMode {
    #[default]
    Simulated,
    /// Simulated fills against the live feed, entry price inflated by slippage
    SimulatedRealFeed,
}

/// The durable bot state aggregate persisted after every mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotState {
    pub balance: f64,
    pub active_positions: Vec<Position>,
    pub trade_history: Vec<ClosedTrade>,
    pub trade_id_counter: u64,
    pub is_running: bool,
    pub trading_mode: TradingMode,
}

impl BotState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            active_positions: Vec::new(),
            trade_history: Vec::new(),
            trade_id_counter: 0,
            is_running: false,
            trading_mode: TradingMode::default(),
        }
    }
}
