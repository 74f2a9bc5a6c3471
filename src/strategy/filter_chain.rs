use super::{base_indicators, BaseIndicators, Evaluation, ScoreContext, Scorer};
use crate::config::BotSettings;
use crate::indicators::calculate_macd;
use crate::models::{MarketRegime, Score, StrategyMetrics, Trend};

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// Default scoring algorithm: a fixed-order filter chain that short-circuits
/// to HOLD on the first failing filter, then buckets by RSI.
///
/// Order: market regime -> long-horizon trend -> short-horizon trend
/// (ADX + SMA) -> volatility floor -> volume confirmation -> RSI.
#[derive(Debug, Clone, Default)]
pub struct FilterChainScorer;

/// The pure decision over an indicator snapshot; separated from indicator
/// computation so the chain is testable with exact values.
pub fn apply_filter_chain(
    base: &BaseIndicators,
    regime: MarketRegime,
    trend_long: Trend,
    settings: &BotSettings,
) -> Score {
    if settings.use_market_regime_filter && regime != MarketRegime::Uptrend {
        return Score::Hold;
    }

    if settings.use_multi_timeframe_confirmation && trend_long != Trend::Up {
        return Score::Hold;
    }

    if base.adx <= 25.0 || base.close <= base.sma_short {
        return Score::Hold;
    }

    if base.volatility < settings.min_volatility_pct {
        return Score::Hold;
    }

    if settings.use_volume_confirmation && base.volume < base.avg_volume {
        return Score::Hold;
    }

    if base.rsi > 50.0 && base.rsi < 70.0 {
        Score::StrongBuy
    } else if base.rsi > 50.0 {
        Score::Buy
    } else {
        Score::Hold
    }
}

impl Scorer for FilterChainScorer {
    fn name(&self) -> &'static str {
        "filter_chain"
    }

    fn min_candles(&self) -> usize {
        // MACD is the slowest input: slow + signal - 1 closes
        MACD_SLOW + MACD_SIGNAL + 1
    }

    fn evaluate(&self, ctx: &ScoreContext<'_>) -> Option<Evaluation> {
        let base = base_indicators(ctx.candles)?;

        let closes: Vec<f64> = ctx.candles.iter().map(|c| c.close).collect();
        let macd = calculate_macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL)?;

        let score = apply_filter_chain(
            &base,
            ctx.pair.market_regime,
            ctx.pair.trend_long,
            ctx.settings,
        );

        Some(Evaluation {
            score,
            indicators: base,
            metrics: StrategyMetrics::FilterChain {
                macd_histogram: macd.histogram,
                sma_short: base.sma_short,
                avg_volume: base.avg_volume,
            },
            stop_hint: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_snapshot() -> BaseIndicators {
        BaseIndicators {
            close: 101.0,
            volume: 1_500.0,
            rsi: 55.0,
            adx: 30.0,
            atr: 1.0,
            sma_short: 100.0,
            volatility: 1.2,
            avg_volume: 1_000.0,
            trend: Trend::Up,
        }
    }

    fn settings() -> BotSettings {
        BotSettings {
            min_volatility_pct: 0.5,
            use_market_regime_filter: true,
            use_multi_timeframe_confirmation: true,
            use_volume_confirmation: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_downtrend_regime_short_circuits_to_hold() {
        // Scenario A: regime filter fails, RSI/ADX must not matter
        let base = passing_snapshot();
        let score = apply_filter_chain(
            &base,
            MarketRegime::Downtrend,
            Trend::Up,
            &settings(),
        );
        assert_eq!(score, Score::Hold);
    }

    #[test]
    fn test_all_filters_pass_rsi_sweet_spot_is_strong_buy() {
        // Scenario B: everything passes, RSI 55 is inside (50, 70)
        let score = apply_filter_chain(
            &passing_snapshot(),
            MarketRegime::Uptrend,
            Trend::Up,
            &settings(),
        );
        assert_eq!(score, Score::StrongBuy);
    }

    #[test]
    fn test_overbought_rsi_downgrades_to_buy() {
        // Scenario C: RSI 72 passes the base conditions but not the sweet spot
        let base = BaseIndicators {
            rsi: 72.0,
            ..passing_snapshot()
        };
        let score = apply_filter_chain(&base, MarketRegime::Uptrend, Trend::Up, &settings());
        assert_eq!(score, Score::Buy);
    }

    #[test]
    fn test_weak_adx_is_hold() {
        let base = BaseIndicators {
            adx: 20.0,
            ..passing_snapshot()
        };
        let score = apply_filter_chain(&base, MarketRegime::Uptrend, Trend::Up, &settings());
        assert_eq!(score, Score::Hold);
    }

    #[test]
    fn test_volatility_floor() {
        let base = BaseIndicators {
            volatility: 0.3,
            ..passing_snapshot()
        };
        let score = apply_filter_chain(&base, MarketRegime::Uptrend, Trend::Up, &settings());
        assert_eq!(score, Score::Hold);
    }

    #[test]
    fn test_volume_confirmation_respects_toggle() {
        let base = BaseIndicators {
            volume: 500.0,
            ..passing_snapshot()
        };

        let strict = settings();
        assert_eq!(
            apply_filter_chain(&base, MarketRegime::Uptrend, Trend::Up, &strict),
            Score::Hold
        );

        let relaxed = BotSettings {
            use_volume_confirmation: false,
            ..settings()
        };
        assert_eq!(
            apply_filter_chain(&base, MarketRegime::Uptrend, Trend::Up, &relaxed),
            Score::StrongBuy
        );
    }

    #[test]
    fn test_long_trend_confirmation_optional() {
        let base = passing_snapshot();

        let strict = settings();
        assert_eq!(
            apply_filter_chain(&base, MarketRegime::Uptrend, Trend::Neutral, &strict),
            Score::Hold
        );

        let relaxed = BotSettings {
            use_multi_timeframe_confirmation: false,
            ..settings()
        };
        assert_eq!(
            apply_filter_chain(&base, MarketRegime::Uptrend, Trend::Neutral, &relaxed),
            Score::StrongBuy
        );
    }

    #[test]
    fn test_bearish_rsi_is_hold_even_when_filters_pass() {
        let base = BaseIndicators {
            rsi: 45.0,
            ..passing_snapshot()
        };
        let score = apply_filter_chain(&base, MarketRegime::Uptrend, Trend::Up, &settings());
        assert_eq!(score, Score::Hold);
    }

    #[test]
    fn test_evaluate_skips_during_warmup() {
        use crate::models::ScannedPair;
        use crate::strategy::test_support::trending_candles;

        let scorer = FilterChainScorer::default();
        let pair = ScannedPair::new("XYZUSDT");
        let settings = settings();

        let short = trending_candles(10, 100.0, 0.5);
        let ctx = ScoreContext {
            symbol: "XYZUSDT",
            candles: &short,
            pair: &pair,
            settings: &settings,
        };
        assert!(scorer.evaluate(&ctx).is_none());
    }

    #[test]
    fn test_evaluate_fills_filter_chain_metrics() {
        use crate::models::{MarketRegime, ScannedPair};
        use crate::strategy::test_support::trending_candles;

        let scorer = FilterChainScorer::default();
        let mut pair = ScannedPair::new("XYZUSDT");
        pair.market_regime = MarketRegime::Uptrend;
        pair.trend_long = Trend::Up;

        let candles = trending_candles(60, 100.0, 0.5);
        let ctx = ScoreContext {
            symbol: "XYZUSDT",
            candles: &candles,
            pair: &pair,
            settings: &settings(),
        };

        let eval = scorer.evaluate(&ctx).unwrap();
        assert!(matches!(
            eval.metrics,
            StrategyMetrics::FilterChain { .. }
        ));
        assert!(eval.stop_hint.is_none());
    }
}
