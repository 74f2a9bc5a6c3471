use crate::config::BotSettings;
use crate::models::{Candle, MarketRegime, ScannedPair, Score, Trend};
use crate::risk::CooldownRegistry;
use crate::strategy::{ScoreContext, Scorer};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Result of rescoring one pair on a closed candle
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub pair: ScannedPair,
    /// Structural stop-loss suggestion forwarded to entry evaluation
    pub stop_hint: Option<f64>,
}

/// Owns the monitored-pair set and drives the configured scorer.
///
/// Single writer: all mutation happens on the engine loop. Discovery
/// refreshes the set and the slow-moving fields; closed candles on the
/// scoring timeframe refresh the live fields and the score.
pub struct PairScanner {
    pairs: HashMap<String, ScannedPair>,
    scorer: Box<dyn Scorer>,
}

impl PairScanner {
    pub fn new(scorer: Box<dyn Scorer>) -> Self {
        Self {
            pairs: HashMap::new(),
            scorer,
        }
    }

    /// Swap the scoring algorithm (settings update changed the strategy id)
    pub fn set_scorer(&mut self, scorer: Box<dyn Scorer>) {
        tracing::info!(target: "scanner", strategy = scorer.name(), "Scorer switched");
        self.scorer = scorer;
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.pairs.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&ScannedPair> {
        self.pairs.get(symbol)
    }

    /// All monitored pairs, sorted by symbol for stable output
    pub fn pairs(&self) -> Vec<ScannedPair> {
        let mut pairs: Vec<ScannedPair> = self.pairs.values().cloned().collect();
        pairs.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Merge one discovery result into the set.
    ///
    /// An existing pair keeps its live fields (price, indicators, score)
    /// and only has the discovery-sourced fields overwritten; a new symbol
    /// starts with defaults and is flagged for historical hydration.
    /// Returns true when the symbol is new.
    pub fn upsert_from_discovery(
        &mut self,
        symbol: &str,
        price: f64,
        volume: f64,
        regime: MarketRegime,
        trend_long: Trend,
    ) -> bool {
        if let Some(pair) = self.pairs.get_mut(symbol) {
            pair.volume = volume;
            pair.market_regime = regime;
            pair.trend_long = trend_long;
            false
        } else {
            let mut pair = ScannedPair::new(symbol);
            pair.price = price;
            pair.volume = volume;
            pair.market_regime = regime;
            pair.trend_long = trend_long;
            self.pairs.insert(symbol.to_string(), pair);
            true
        }
    }

    /// Drop symbols absent from the latest discovery cycle; returns them
    pub fn retain_symbols(&mut self, keep: &HashSet<String>) -> Vec<String> {
        let removed: Vec<String> = self
            .pairs
            .keys()
            .filter(|symbol| !keep.contains(*symbol))
            .cloned()
            .collect();

        for symbol in &removed {
            self.pairs.remove(symbol);
        }
        removed
    }

    pub fn mark_hydrated(&mut self, symbol: &str) {
        if let Some(pair) = self.pairs.get_mut(symbol) {
            pair.needs_hydration = false;
        }
    }

    /// Live price update from the tick stream
    pub fn update_price(&mut self, symbol: &str, price: f64) {
        if let Some(pair) = self.pairs.get_mut(symbol) {
            pair.price = price;
        }
    }

    /// Rescore a pair after a closed candle on the scoring timeframe.
    ///
    /// Returns None (no score change, informational log only) for unknown
    /// symbols or while indicators are warming up. A BUY/STRONG_BUY under
    /// an active cooldown is downgraded to COOLDOWN; the technical score
    /// stays visible in `raw_score`.
    pub fn on_candle_closed(
        &mut self,
        symbol: &str,
        candles: &[Candle],
        settings: &BotSettings,
        cooldowns: &CooldownRegistry,
        now: DateTime<Utc>,
    ) -> Option<ScanOutcome> {
        let pair = self.pairs.get(symbol)?;

        let ctx = ScoreContext {
            symbol,
            candles,
            pair,
            settings,
        };

        let Some(eval) = self.scorer.evaluate(&ctx) else {
            tracing::info!(
                target: "scanner",
                symbol,
                candles = candles.len(),
                needed = self.scorer.min_candles(),
                "Indicators warming up, event skipped"
            );
            return None;
        };

        let pair = self.pairs.get_mut(symbol)?;
        let base = eval.indicators;

        pair.price = base.close;
        pair.volatility = base.volatility;
        pair.trend = base.trend;
        pair.rsi = base.rsi;
        pair.adx = base.adx;
        pair.atr = base.atr;
        pair.metrics = eval.metrics;
        pair.raw_score = eval.score;

        pair.score = if eval.score.is_entry_signal() && cooldowns.is_active(symbol, now) {
            tracing::info!(
                target: "scanner",
                symbol,
                raw_score = ?eval.score,
                "Entry signal suppressed by cooldown"
            );
            Score::Cooldown
        } else {
            eval.score
        };

        Some(ScanOutcome {
            pair: pair.clone(),
            stop_hint: eval.stop_hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::trending_candles;
    use crate::strategy::{make_scorer, FilterChainScorer};

    fn scanner_with_pair(symbol: &str) -> PairScanner {
        let mut scanner = PairScanner::new(Box::new(FilterChainScorer::default()));
        scanner.upsert_from_discovery(symbol, 100.0, 2_000_000.0, MarketRegime::Uptrend, Trend::Up);
        scanner
    }

    fn entry_settings() -> BotSettings {
        BotSettings {
            min_volatility_pct: 0.1,
            use_volume_confirmation: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_discovery_merge_preserves_live_fields() {
        let mut scanner = scanner_with_pair("XYZUSDT");

        // simulate live updates
        scanner.update_price("XYZUSDT", 123.0);
        {
            let pair = scanner.pairs.get_mut("XYZUSDT").unwrap();
            pair.rsi = 61.0;
            pair.score = Score::Buy;
        }

        let is_new = scanner.upsert_from_discovery(
            "XYZUSDT",
            999.0,
            3_000_000.0,
            MarketRegime::Downtrend,
            Trend::Down,
        );

        assert!(!is_new);
        let pair = scanner.get("XYZUSDT").unwrap();
        // live fields preserved
        assert_eq!(pair.price, 123.0);
        assert_eq!(pair.rsi, 61.0);
        assert_eq!(pair.score, Score::Buy);
        // discovery-sourced fields overwritten
        assert_eq!(pair.volume, 3_000_000.0);
        assert_eq!(pair.market_regime, MarketRegime::Downtrend);
        assert_eq!(pair.trend_long, Trend::Down);
    }

    #[test]
    fn test_retain_drops_stale_symbols() {
        let mut scanner = scanner_with_pair("XYZUSDT");
        scanner.upsert_from_discovery("ABCUSDT", 1.0, 1e6, MarketRegime::Neutral, Trend::Neutral);

        let keep: HashSet<String> = ["ABCUSDT".to_string()].into_iter().collect();
        let removed = scanner.retain_symbols(&keep);

        assert_eq!(removed, vec!["XYZUSDT".to_string()]);
        assert!(!scanner.contains("XYZUSDT"));
        assert!(scanner.contains("ABCUSDT"));
    }

    #[test]
    fn test_closed_candle_scores_pair() {
        let mut scanner = scanner_with_pair("XYZUSDT");
        let candles = trending_candles(60, 100.0, 0.5);
        let settings = entry_settings();
        let cooldowns = CooldownRegistry::new();

        let outcome = scanner
            .on_candle_closed("XYZUSDT", &candles, &settings, &cooldowns, Utc::now())
            .unwrap();

        // steady uptrend with high RSI: base filters pass, RSI out of the
        // 50-70 sweet spot lands on BUY
        assert!(outcome.pair.score.is_entry_signal());
        assert_eq!(outcome.pair.raw_score, outcome.pair.score);
        assert!(outcome.pair.rsi > 50.0);
        assert_eq!(outcome.pair.trend, Trend::Up);
    }

    #[test]
    fn test_cooldown_downgrades_score_but_keeps_raw() {
        let mut scanner = scanner_with_pair("XYZUSDT");
        let candles = trending_candles(60, 100.0, 0.5);
        let settings = entry_settings();
        let now = Utc::now();

        let mut cooldowns = CooldownRegistry::new();
        cooldowns.record_loss("XYZUSDT", now, 4.0);

        let outcome = scanner
            .on_candle_closed("XYZUSDT", &candles, &settings, &cooldowns, now)
            .unwrap();

        assert_eq!(outcome.pair.score, Score::Cooldown);
        assert!(outcome.pair.raw_score.is_entry_signal());
    }

    #[test]
    fn test_warmup_event_is_skipped_without_score_change() {
        let mut scanner = scanner_with_pair("XYZUSDT");
        let candles = trending_candles(10, 100.0, 0.5);
        let settings = entry_settings();
        let cooldowns = CooldownRegistry::new();

        let before = scanner.get("XYZUSDT").unwrap().clone();
        let outcome =
            scanner.on_candle_closed("XYZUSDT", &candles, &settings, &cooldowns, Utc::now());

        assert!(outcome.is_none());
        assert_eq!(scanner.get("XYZUSDT").unwrap(), &before);
    }

    #[test]
    fn test_unknown_symbol_is_ignored() {
        let mut scanner = PairScanner::new(make_scorer("filter_chain"));
        let candles = trending_candles(60, 100.0, 0.5);
        let outcome = scanner.on_candle_closed(
            "NOPEUSDT",
            &candles,
            &BotSettings::default(),
            &CooldownRegistry::new(),
            Utc::now(),
        );
        assert!(outcome.is_none());
    }
}
