// Scoring strategies
//
// One scorer interface, one implementation per algorithm variant, selected
// by the `strategy` setting. The filter-chain scorer is the default.
pub mod breakout;
pub mod filter_chain;

use crate::config::BotSettings;
use crate::indicators::{
    calculate_adx, calculate_atr, calculate_average_volume, calculate_rsi, calculate_sma,
    calculate_volatility,
};
use crate::models::{Candle, ScannedPair, Score, StrategyMetrics, Trend};

pub use breakout::BreakoutScorer;
pub use filter_chain::FilterChainScorer;

pub const RSI_PERIOD: usize = 14;
pub const ADX_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const SMA_PERIOD: usize = 20;
pub const VOLUME_PERIOD: usize = 20;

/// Everything a scorer may read for one evaluation. `pair` carries the
/// discovery-sourced fields (market regime, long-horizon trend).
pub struct ScoreContext<'a> {
    pub symbol: &'a str,
    pub candles: &'a [Candle],
    pub pair: &'a ScannedPair,
    pub settings: &'a BotSettings,
}

/// Rolling indicator values recomputed on each closed candle
#[derive(Debug, Clone, Copy)]
pub struct BaseIndicators {
    pub close: f64,
    pub volume: f64,
    pub rsi: f64,
    pub adx: f64,
    pub atr: f64,
    pub sma_short: f64,
    pub volatility: f64,
    pub avg_volume: f64,
    pub trend: Trend,
}

/// Result of one scorer evaluation
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub score: Score,
    pub indicators: BaseIndicators,
    pub metrics: StrategyMetrics,
    /// Structural stop-loss suggestion (e.g. breakout candle's prior low)
    pub stop_hint: Option<f64>,
}

/// A pluggable scoring algorithm.
///
/// `evaluate` returns None while indicators are still warming up; the
/// caller skips the event without changing the recorded score.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candles required before `evaluate` can produce a score
    fn min_candles(&self) -> usize;

    fn evaluate(&self, ctx: &ScoreContext<'_>) -> Option<Evaluation>;
}

/// Build the configured scorer; unknown ids are rejected at startup by
/// `BotSettings::validate`, so this defaults defensively to filter-chain.
pub fn make_scorer(strategy: &str) -> Box<dyn Scorer> {
    match strategy {
        "breakout" => Box::new(BreakoutScorer::default()),
        _ => Box::new(FilterChainScorer::default()),
    }
}

/// Shared indicator snapshot both scorers start from.
///
/// None if any input is still warming up — a missing indicator must never
/// be replaced by a default that could read as a real signal.
pub(crate) fn base_indicators(candles: &[Candle]) -> Option<BaseIndicators> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last = candles.last()?;

    let rsi = calculate_rsi(&closes, RSI_PERIOD)?;
    let (adx, _plus_di, _minus_di) = calculate_adx(candles, ADX_PERIOD)?;
    let atr = calculate_atr(candles, ATR_PERIOD)?;
    let sma_short = calculate_sma(&closes, SMA_PERIOD)?;
    let volatility = calculate_volatility(&closes[closes.len().saturating_sub(SMA_PERIOD)..])?;
    let avg_volume = calculate_average_volume(candles, VOLUME_PERIOD)?;

    let trend = if last.close > sma_short {
        Trend::Up
    } else if last.close < sma_short {
        Trend::Down
    } else {
        Trend::Neutral
    };

    Some(BaseIndicators {
        close: last.close,
        volume: last.volume,
        rsi,
        adx,
        atr,
        sma_short,
        volatility,
        avg_volume,
        trend,
    })
}
