use super::{base_indicators, Evaluation, ScoreContext, Scorer};
use crate::indicators::calculate_bollinger;
use crate::models::{Score, StrategyMetrics, Trend};

pub const BB_PERIOD: usize = 20;
pub const BB_MULTIPLIER: f64 = 2.0;
/// Band widths compared across this many trailing periods
pub const SQUEEZE_WINDOW: usize = 50;
/// A width in the bottom 15th percentile of the window is a squeeze
pub const SQUEEZE_PERCENTILE: f64 = 0.15;
/// Breakout volume must exceed this multiple of the 20-period average
pub const BREAKOUT_VOLUME_MULT: f64 = 2.0;

/// Alternate scoring algorithm: Bollinger-squeeze breakout.
///
/// While band width sits in the bottom percentile of the trailing window
/// the pair is COMPRESSION. The candle immediately following a squeeze
/// that closes above the squeeze's upper band is a STRONG_BUY when volume
/// and momentum validate it (the prior candle's low becomes the structural
/// stop hint), and FAKE_BREAKOUT when they don't.
#[derive(Debug, Clone, Default)]
pub struct BreakoutScorer;

/// True when the window's last width is inside the bottom percentile
fn in_bottom_percentile(widths: &[f64], pct: f64) -> bool {
    let current = widths[widths.len() - 1];
    let mut sorted = widths.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * pct).floor() as usize;
    current <= sorted[idx]
}

impl Scorer for BreakoutScorer {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn min_candles(&self) -> usize {
        // one width per end position, SQUEEZE_WINDOW + 1 positions, each
        // needing BB_PERIOD closes
        BB_PERIOD + SQUEEZE_WINDOW
    }

    fn evaluate(&self, ctx: &ScoreContext<'_>) -> Option<Evaluation> {
        let candles = ctx.candles;
        if candles.len() < self.min_candles() {
            return None;
        }

        let base = base_indicators(candles)?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let n = closes.len();

        // Band width at each of the last SQUEEZE_WINDOW + 1 closes; the
        // extra position gives the squeeze state of the previous candle.
        let mut widths = Vec::with_capacity(SQUEEZE_WINDOW + 1);
        for end in (n - SQUEEZE_WINDOW - 1)..n {
            let bands = calculate_bollinger(&closes[..=end], BB_PERIOD, BB_MULTIPLIER)?;
            widths.push(bands.width_pct());
        }

        let prev_squeezed = in_bottom_percentile(&widths[..SQUEEZE_WINDOW], SQUEEZE_PERCENTILE);
        let curr_squeezed = in_bottom_percentile(&widths[1..], SQUEEZE_PERCENTILE);

        // Break test uses the squeeze's own bands, not bands inflated by
        // the breakout candle itself.
        let squeeze_bands = calculate_bollinger(&closes[..n - 1], BB_PERIOD, BB_MULTIPLIER)?;
        let current_bands = calculate_bollinger(&closes, BB_PERIOD, BB_MULTIPLIER)?;

        let mut stop_hint = None;
        let score = if prev_squeezed && base.close > squeeze_bands.upper {
            let volume_ok = base.volume >= BREAKOUT_VOLUME_MULT * base.avg_volume;
            let momentum_ok = base.rsi >= 50.0;
            let trend_ok =
                !ctx.settings.use_multi_timeframe_confirmation || ctx.pair.trend_long == Trend::Up;

            if volume_ok && momentum_ok && trend_ok {
                stop_hint = Some(candles[n - 2].low);
                Score::StrongBuy
            } else {
                Score::FakeBreakout
            }
        } else if curr_squeezed {
            Score::Compression
        } else {
            Score::Hold
        };

        Some(Evaluation {
            score,
            indicators: base,
            metrics: StrategyMetrics::Breakout {
                band_width_pct: current_bands.width_pct(),
                upper_band: current_bands.upper,
                squeezed: curr_squeezed,
            },
            stop_hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotSettings;
    use crate::models::{Candle, ScannedPair};
    use chrono::{TimeZone, Utc};

    fn candle(i: usize, close: f64, range: f64, volume: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(i as i64),
            open: close,
            high: close + range,
            low: close - range,
            close,
            volume,
        }
    }

    /// Tightly coiled series: price oscillates +/-0.05 around 100
    fn squeezed_series(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let wiggle = if i % 2 == 0 { 0.05 } else { -0.05 };
                candle(i, 100.0 + wiggle, 0.1, 1_000.0)
            })
            .collect()
    }

    fn scorer_ctx<'a>(
        candles: &'a [Candle],
        pair: &'a ScannedPair,
        settings: &'a BotSettings,
    ) -> ScoreContext<'a> {
        ScoreContext {
            symbol: "XYZUSDT",
            candles,
            pair,
            settings,
        }
    }

    fn relaxed_settings() -> BotSettings {
        BotSettings {
            use_multi_timeframe_confirmation: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_squeeze_reads_as_compression() {
        let candles = squeezed_series(80);
        let pair = ScannedPair::new("XYZUSDT");
        let settings = relaxed_settings();

        let eval = BreakoutScorer::default()
            .evaluate(&scorer_ctx(&candles, &pair, &settings))
            .unwrap();
        assert_eq!(eval.score, Score::Compression);
        assert!(matches!(
            eval.metrics,
            StrategyMetrics::Breakout { squeezed: true, .. }
        ));
    }

    #[test]
    fn test_validated_breakout_is_strong_buy_with_stop_hint() {
        let mut candles = squeezed_series(80);
        // breakout candle: well above the coil on 3x volume
        candles.push(candle(80, 103.0, 0.5, 3_000.0));

        let pair = ScannedPair::new("XYZUSDT");
        let settings = relaxed_settings();

        let eval = BreakoutScorer::default()
            .evaluate(&scorer_ctx(&candles, &pair, &settings))
            .unwrap();
        assert_eq!(eval.score, Score::StrongBuy);

        // structural stop = low of the candle before the breakout
        let prior_low = candles[candles.len() - 2].low;
        assert_eq!(eval.stop_hint, Some(prior_low));
    }

    #[test]
    fn test_low_volume_breakout_is_fake() {
        let mut candles = squeezed_series(80);
        candles.push(candle(80, 103.0, 0.5, 1_100.0));

        let pair = ScannedPair::new("XYZUSDT");
        let settings = relaxed_settings();

        let eval = BreakoutScorer::default()
            .evaluate(&scorer_ctx(&candles, &pair, &settings))
            .unwrap();
        assert_eq!(eval.score, Score::FakeBreakout);
        assert!(eval.stop_hint.is_none());
    }

    #[test]
    fn test_breakout_against_long_trend_is_fake_when_confirmation_on() {
        let mut candles = squeezed_series(80);
        candles.push(candle(80, 103.0, 0.5, 3_000.0));

        let pair = ScannedPair::new("XYZUSDT"); // trend_long stays Neutral
        let settings = BotSettings::default(); // confirmation enabled

        let eval = BreakoutScorer::default()
            .evaluate(&scorer_ctx(&candles, &pair, &settings))
            .unwrap();
        assert_eq!(eval.score, Score::FakeBreakout);
    }

    #[test]
    fn test_expanding_volatility_is_hold() {
        // wiggle amplitude keeps growing: the latest width is the widest
        let candles: Vec<Candle> = (0..80)
            .map(|i| {
                let amplitude = 0.1 + i as f64 * 0.05;
                let wiggle = if i % 2 == 0 { amplitude } else { -amplitude };
                candle(i, 100.0 + wiggle, amplitude, 1_000.0)
            })
            .collect();

        let pair = ScannedPair::new("XYZUSDT");
        let settings = relaxed_settings();

        let eval = BreakoutScorer::default()
            .evaluate(&scorer_ctx(&candles, &pair, &settings))
            .unwrap();
        assert_eq!(eval.score, Score::Hold);
    }

    #[test]
    fn test_warmup_returns_none() {
        let candles = squeezed_series(40);
        let pair = ScannedPair::new("XYZUSDT");
        let settings = relaxed_settings();

        assert!(BreakoutScorer::default()
            .evaluate(&scorer_ctx(&candles, &pair, &settings))
            .is_none());
    }
}
